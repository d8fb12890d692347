//! Channel configuration and its fluent builder.

use std::sync::Arc;

use crate::error::Error;
use crate::pipe::{PipeReader, PipeWriter};

const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 4 * 1024;
const DEFAULT_PACKAGE_QUEUE_DEPTH: usize = 128;

/// Recognized channel options.
///
/// Constructed through [`ChannelBuilder`] rather than directly, so that
/// invalid combinations (a non-positive `receive_buffer_size`) are caught
/// before a [`crate::channel::Channel`] is built.
#[derive(Clone)]
pub struct ChannelOptions {
    /// Target hint for contiguous inbound reads, in bytes.
    pub receive_buffer_size: usize,
    /// `0` = unlimited; otherwise the hard upper bound on bytes a single
    /// package may span before the driver closes the channel with
    /// `OversizePackage`.
    pub max_package_length: usize,
    /// Byte capacity bound of the inbound pipe. Ignored when `in_pipe` is
    /// set.
    pub in_pipe_capacity: usize,
    /// Byte capacity bound of the outbound pipe. Ignored when `out_pipe`
    /// is set.
    pub out_pipe_capacity: usize,
    /// Optional pre-constructed inbound pipe (writer, reader), for testing
    /// or injection. When set, `Channel::new` uses it directly instead of
    /// building a fresh pipe from `in_pipe_capacity`.
    pub in_pipe: Option<(PipeWriter, PipeReader)>,
    /// Optional pre-constructed outbound pipe. See `in_pipe`.
    pub out_pipe: Option<(PipeWriter, PipeReader)>,
    /// Bounded depth of the package queue.
    pub package_queue_depth: usize,
    /// Name used to disambiguate log lines from multiple concurrently
    /// running channels. Defaults to `"channel"`.
    pub log_target: String,
    /// Invoked exactly once, after the fill/parser/send loops have all
    /// settled (see [`crate::channel::Channel::run`]). `None` by default.
    pub on_closed: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl std::fmt::Debug for ChannelOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelOptions")
            .field("receive_buffer_size", &self.receive_buffer_size)
            .field("max_package_length", &self.max_package_length)
            .field("in_pipe_capacity", &self.in_pipe_capacity)
            .field("out_pipe_capacity", &self.out_pipe_capacity)
            .field("in_pipe", &self.in_pipe.is_some())
            .field("out_pipe", &self.out_pipe.is_some())
            .field("package_queue_depth", &self.package_queue_depth)
            .field("log_target", &self.log_target)
            .field("on_closed", &self.on_closed.is_some())
            .finish()
    }
}

impl Default for ChannelOptions {
    fn default() -> Self {
        ChannelOptions {
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            max_package_length: 0,
            in_pipe_capacity: 4 * DEFAULT_RECEIVE_BUFFER_SIZE,
            out_pipe_capacity: 4 * DEFAULT_RECEIVE_BUFFER_SIZE,
            in_pipe: None,
            out_pipe: None,
            package_queue_depth: DEFAULT_PACKAGE_QUEUE_DEPTH,
            log_target: "channel".to_string(),
            on_closed: None,
        }
    }
}

/// Fluent builder for [`ChannelOptions`].
///
/// ```
/// use pipelane::ChannelBuilder;
///
/// let options = ChannelBuilder::new()
///     .receive_buffer_size(8 * 1024)
///     .max_package_length(1 << 20)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Debug, Default)]
pub struct ChannelBuilder {
    options: ChannelOptions,
    in_pipe_capacity_set: bool,
    out_pipe_capacity_set: bool,
}

impl ChannelBuilder {
    pub fn new() -> Self {
        ChannelBuilder {
            options: ChannelOptions::default(),
            in_pipe_capacity_set: false,
            out_pipe_capacity_set: false,
        }
    }

    pub fn receive_buffer_size(mut self, size: usize) -> Self {
        self.options.receive_buffer_size = size;
        if !self.in_pipe_capacity_set {
            self.options.in_pipe_capacity = 4 * size;
        }
        if !self.out_pipe_capacity_set {
            self.options.out_pipe_capacity = 4 * size;
        }
        self
    }

    pub fn max_package_length(mut self, max: usize) -> Self {
        self.options.max_package_length = max;
        self
    }

    pub fn in_pipe_capacity(mut self, capacity: usize) -> Self {
        self.options.in_pipe_capacity = capacity;
        self.in_pipe_capacity_set = true;
        self
    }

    pub fn out_pipe_capacity(mut self, capacity: usize) -> Self {
        self.options.out_pipe_capacity = capacity;
        self.out_pipe_capacity_set = true;
        self
    }

    /// Inject a pre-constructed inbound pipe rather than letting
    /// `Channel::new` build one from `in_pipe_capacity`. Intended for
    /// tests that want to feed bytes directly into the parser driver
    /// without going through a transport.
    pub fn in_pipe(mut self, writer: PipeWriter, reader: PipeReader) -> Self {
        self.options.in_pipe = Some((writer, reader));
        self
    }

    /// Inject a pre-constructed outbound pipe. See [`Self::in_pipe`].
    pub fn out_pipe(mut self, writer: PipeWriter, reader: PipeReader) -> Self {
        self.options.out_pipe = Some((writer, reader));
        self
    }

    pub fn package_queue_depth(mut self, depth: usize) -> Self {
        self.options.package_queue_depth = depth;
        self
    }

    pub fn log_target(mut self, target: impl Into<String>) -> Self {
        self.options.log_target = target.into();
        self
    }

    /// Register a callback fired exactly once, after the channel's
    /// background loops have all settled.
    pub fn on_closed(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.options.on_closed = Some(Arc::new(callback));
        self
    }

    /// Validate and produce the final [`ChannelOptions`].
    pub fn build(self) -> Result<ChannelOptions, Error> {
        if self.options.receive_buffer_size == 0 {
            return Err(Error::InvalidOption(
                "receive_buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(self.options)
    }
}
