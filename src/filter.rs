//! Protocol filter contract and the cursor filters parse over.
//!
//! The source interface this crate replaces used an inheritance-style
//! filter with a mutable `NextFilter` property. Here a filter is a small
//! capability trait: given a cursor over whatever bytes are currently
//! buffered, produce `Some(package)` or `None` (need more data), and
//! optionally hand off to a successor filter afterward. Context handoff
//! across a handoff is performed by the driver, never by the filter
//! itself — a filter only ever sees its own `context`.

/// A cursor over the bytes currently buffered by a [`crate::pipe::Pipe`],
/// handed to [`PipelineFilter::filter`] on every invocation.
///
/// Tracks how many bytes have been consumed since the cursor was created so
/// the driver can compute the length metric used for `max_package_length`
/// enforcement (see the module docs on [`crate::driver`]).
pub struct SeqReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SeqReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        SeqReader { data, pos: 0 }
    }

    /// The unconsumed remainder of the buffer.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Number of unconsumed bytes.
    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the cursor has reached the end of the buffer.
    pub fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Advance the cursor by `len` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the remaining length.
    pub fn advance(&mut self, len: usize) {
        assert!(len <= self.remaining_len(), "SeqReader::advance past end");
        self.pos += len;
    }

    /// Find the first occurrence of `needle` in the unconsumed remainder,
    /// as an offset from the current position. A common building block for
    /// delimiter-based filters.
    pub fn find(&self, needle: u8) -> Option<usize> {
        self.remaining().iter().position(|&b| b == needle)
    }

    /// Bytes consumed since this cursor was created.
    pub(crate) fn consumed_since_entry(&self) -> usize {
        self.pos
    }
}

/// One stage of protocol parsing, producing packages of type `P`.
///
/// `Context` is the protocol-specific state a filter chain shares across a
/// handoff (see `take_next`): opaque to the driver, which only ever copies
/// it from one filter to the next, never inspects it. A filter chain that
/// has no state to carry across a handoff sets `Context = ()` and relies on
/// the default `context`/`set_context` implementations.
pub trait PipelineFilter<P>: Send {
    type Context: Send + Default;

    /// Advance `reader` and return a fully-parsed package, or `None` if
    /// more bytes are needed. Must consume at least the bytes that belong
    /// to any package it returns.
    fn filter(&mut self, reader: &mut SeqReader<'_>) -> Option<P>;

    /// Called once after each package this filter emits, to clear any
    /// per-package scratch state before the next `filter` call.
    fn reset(&mut self) {}

    /// Take the successor filter, if this call produced a protocol mode
    /// switch. Returning `Some` hands control to the successor for all
    /// subsequent bytes, starting with whatever remains unconsumed in the
    /// current buffer. The driver calls `context`/`set_context` itself
    /// immediately after a handoff — the successor is not responsible for
    /// fetching its predecessor's state.
    fn take_next(&mut self) -> Option<Box<dyn PipelineFilter<P, Context = Self::Context>>> {
        None
    }

    /// Snapshot this filter's context, to be carried into a successor via
    /// `set_context` when the driver performs a handoff.
    fn context(&self) -> Self::Context {
        Self::Context::default()
    }

    /// Receive the context carried over from the predecessor filter on a
    /// handoff. Called by the driver right after `take_next` returns
    /// `Some`, before the successor's first `filter` call.
    fn set_context(&mut self, _context: Self::Context) {}
}
