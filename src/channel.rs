//! The duplex package channel: owns the transport, the two pipes, and the
//! fill/parser/send loops that move bytes and packages between them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::driver;
use crate::encoder::PackageEncoder;
use crate::error::Error;
use crate::filter::PipelineFilter;
use crate::options::ChannelOptions;
use crate::pipe::{self, PipeReader, PipeWriter};
use crate::queue::{self, PackageStream};
use crate::transport::{Transport, TransportReader, TransportWriter};

/// Lifecycle state of a [`Channel`]. Mirrors the teacher crate's small
/// `Copy`/`Eq` status-enum shape, repurposed to the channel's own states.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ChannelState {
    Created,
    Running,
    Closing,
    Closed,
}

struct Shared {
    close_requested: AtomicBool,
    closed_fired: AtomicBool,
    log_target: String,
    on_closed: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Races against the fill loop's pending transport read. The fill loop
    /// owns its read half outright and nothing else can reach into it to
    /// cancel a pending read directly, so this lets it drop its own read
    /// future and close up on its own.
    close_signal: Arc<Notify>,
}

/// A duplex, package-oriented channel over a byte transport.
///
/// Constructed via [`Channel::new`] with a ready transport, an initial
/// filter, and [`ChannelOptions`]. [`Channel::run`] starts the channel and
/// returns the package stream and a handle for closing it.
pub struct Channel<P, C: Send + Default> {
    inbound_writer: PipeWriter,
    inbound_reader: PipeReader,
    outbound_writer: PipeWriter,
    outbound_reader: PipeReader,
    transport_reader: Box<dyn TransportReader>,
    transport_writer: Box<dyn TransportWriter>,
    filter: Box<dyn PipelineFilter<P, Context = C>>,
    options: ChannelOptions,
}

/// Entry point for writing bytes/packages back to the peer.
///
/// Cheap to clone; concurrent senders are safe without any external lock —
/// the outbound pipe serializes the reserve/write/commit sequence
/// internally so encoded writes from different callers never interleave.
#[derive(Clone)]
pub struct Sender<P> {
    outbound: PipeWriter,
    _marker: std::marker::PhantomData<fn(&P)>,
}

impl<P> Sender<P> {
    /// Write `bytes` verbatim to the outbound pipe. Completes once the
    /// bytes are buffered; does not imply they have reached the transport.
    pub async fn send_bytes(&self, bytes: &[u8]) -> Result<(), Error> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut guard = self.outbound.reserve(bytes.len()).await;
        if guard.is_blocked() {
            return Err(Error::ChannelClosed);
        }
        guard.space(bytes.len()).copy_from_slice(bytes);
        guard.commit(bytes.len());
        drop(guard);
        Ok(())
    }

    /// Encode `pkg` with `encoder` directly into the outbound pipe, then
    /// flush. Reserves `encoder.size_hint(pkg)` bytes up front so an
    /// encoded send is throttled by the same pipe-capacity backpressure as
    /// [`Self::send_bytes`], rather than always reserving the smallest
    /// possible region and growing past capacity as `encode` writes.
    pub async fn send_encoded(
        &self,
        encoder: &mut impl PackageEncoder<P>,
        pkg: &P,
    ) -> Result<(), Error> {
        let mut guard = self.outbound.reserve(encoder.size_hint(pkg).max(1)).await;
        if guard.is_blocked() {
            return Err(Error::ChannelClosed);
        }
        encoder.encode(&mut guard, pkg);
        drop(guard);
        if self.outbound.flush().await {
            return Err(Error::ChannelClosed);
        }
        Ok(())
    }
}

impl<P: Send + 'static, C: Send + Default + 'static> Channel<P, C> {
    /// Construct a channel over `transport`, starting with `filter` as the
    /// active protocol stage. The channel is in [`ChannelState::Created`]
    /// until [`Channel::run`] is called.
    ///
    /// `transport` is split into independent read/write halves right away
    /// (see [`crate::transport::Transport::split`]), so the fill loop and
    /// the send loop each own their half outright and never contend on a
    /// shared lock. If `options.in_pipe`/`options.out_pipe` are set, those
    /// pre-constructed pipes are used in place of freshly allocated ones.
    pub fn new(
        transport: impl Transport + 'static,
        filter: Box<dyn PipelineFilter<P, Context = C>>,
        mut options: ChannelOptions,
    ) -> Self {
        let (inbound_writer, inbound_reader) = options
            .in_pipe
            .take()
            .unwrap_or_else(|| pipe::channel(options.in_pipe_capacity));
        let (outbound_writer, outbound_reader) = options
            .out_pipe
            .take()
            .unwrap_or_else(|| pipe::channel(options.out_pipe_capacity));
        let (transport_reader, transport_writer) = transport.split();
        Channel {
            inbound_writer,
            inbound_reader,
            outbound_writer,
            outbound_reader,
            transport_reader: Box::new(transport_reader),
            transport_writer: Box::new(transport_writer),
            filter,
            options,
        }
    }

    /// A cloneable handle for sending bytes/packages back to the peer.
    pub fn sender(&self) -> Sender<P> {
        Sender {
            outbound: self.outbound_writer.clone(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Start the fill, parser and send loops, and return the lazy package
    /// stream together with a handle for closing the channel. Not
    /// restartable: call this at most once per channel.
    pub fn run(self) -> (PackageStream<P>, ChannelHandle) {
        let (sender, stream) = queue::channel(self.options.package_queue_depth);

        let close_signal = Arc::new(Notify::new());
        let shared = Arc::new(Shared {
            close_requested: AtomicBool::new(false),
            closed_fired: AtomicBool::new(false),
            log_target: self.options.log_target.clone(),
            on_closed: self.options.on_closed.clone(),
            close_signal: close_signal.clone(),
        });
        let log_target: Arc<str> = Arc::from(self.options.log_target.as_str());
        let receive_buffer_size = self.options.receive_buffer_size;
        let max_package_length = self.options.max_package_length;

        let inbound_reader_for_close = self.inbound_reader.clone();
        let outbound_reader_for_close = self.outbound_reader.clone();
        let inbound_reader_for_send_loop = self.inbound_reader.clone();

        let fill_task = tokio::spawn(fill_loop(
            self.transport_reader,
            self.inbound_writer.clone(),
            self.outbound_writer.clone(),
            receive_buffer_size,
            max_package_length,
            close_signal,
            log_target.clone(),
        ));

        let driver_log_target = log_target.clone();
        let driver_task = tokio::spawn(driver::run(
            self.inbound_reader,
            self.filter,
            max_package_length,
            sender,
            shared.close_signal.clone(),
            driver_log_target,
        ));

        let send_task = tokio::spawn(send_loop(
            self.transport_writer,
            self.outbound_reader,
            inbound_reader_for_send_loop,
            shared.close_signal.clone(),
            log_target.clone(),
        ));

        let supervisor_shared = shared.clone();
        let supervisor_log_target = log_target.clone();
        let supervisor_task = tokio::spawn(await_settle_and_fire_on_closed(
            fill_task,
            driver_task,
            send_task,
            supervisor_shared,
            supervisor_log_target,
        ));

        let handle = ChannelHandle {
            inbound_reader: inbound_reader_for_close,
            outbound_reader: outbound_reader_for_close,
            shared,
            supervisor_task: Some(supervisor_task),
        };
        (stream, handle)
    }
}

/// Awaits all three background loops, then fires `on_closed` exactly once.
/// Spawned as its own task so the callback fires as soon as teardown
/// completes, whether or not the caller ever calls
/// [`ChannelHandle::wait_closed`].
async fn await_settle_and_fire_on_closed(
    fill_task: JoinHandle<()>,
    driver_task: JoinHandle<()>,
    send_task: JoinHandle<()>,
    shared: Arc<Shared>,
    log_target: Arc<str>,
) {
    if let Err(err) = fill_task.await {
        log::warn!(target: &*log_target, "fill loop task panicked: {err}");
    }
    if let Err(err) = driver_task.await {
        log::warn!(target: &*log_target, "parser driver task panicked: {err}");
    }
    if let Err(err) = send_task.await {
        log::warn!(target: &*log_target, "send loop task panicked: {err}");
    }
    log::debug!(target: &*log_target, "channel closed");
    if !shared.closed_fired.swap(true, Ordering::SeqCst) {
        if let Some(on_closed) = &shared.on_closed {
            on_closed();
        }
    }
}

/// A handle retained by the caller to explicitly close the channel and to
/// await its full teardown.
pub struct ChannelHandle {
    inbound_reader: PipeReader,
    outbound_reader: PipeReader,
    shared: Arc<Shared>,
    supervisor_task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    /// Request the channel close: cancels the inbound pipe reader (the
    /// parser exits promptly without enqueuing further packages), cancels
    /// the outbound pipe reader (any pending or future `send_*` fails with
    /// `ChannelClosed`), and wakes the fill loop out of its pending
    /// transport read so it can close its half of the transport itself.
    /// Idempotent.
    pub async fn close(&self) {
        if self.shared.close_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        log::debug!(target: &self.shared.log_target, "channel close requested");
        self.inbound_reader.cancel().await;
        self.outbound_reader.cancel().await;
        self.shared.close_signal.notify_one();
    }

    /// Await the fill/parser/send loops settling and `on_closed` firing.
    /// Call after the package stream has ended (the sentinel was observed,
    /// or `close()` was called). Safe to call even if `on_closed` already
    /// fired on its own, and safe to call more than once.
    pub async fn wait_closed(&mut self) {
        if let Some(task) = self.supervisor_task.take() {
            let _ = task.await;
        }
    }
}

/// Pumps bytes from the transport's read half into the inbound pipe until
/// EOF, a fatal I/O error, an explicit close, or the reader side completes.
/// On every exit path the outbound pipe writer is also closed, cascading
/// shutdown into the send loop without a second coordination primitive.
///
/// Each read races against `close_signal` rather than relying on the
/// transport's own shutdown to unblock a pending read: a peer that never
/// sends anything and never closes its own side would otherwise leave this
/// loop parked in `reader.read()` forever. Because the read half is owned
/// exclusively by this loop (see [`crate::transport::Transport::split`]),
/// racing the read against `close_signal` and dropping the loser is enough
/// — there is no shared lock with the send loop to worry about contending
/// on.
async fn fill_loop(
    mut reader: Box<dyn TransportReader>,
    inbound: PipeWriter,
    outbound: PipeWriter,
    receive_buffer_size: usize,
    max_package_length: usize,
    close_signal: Arc<Notify>,
    log_target: Arc<str>,
) {
    let chunk = if max_package_length > 0 {
        receive_buffer_size.min(max_package_length)
    } else {
        receive_buffer_size
    };

    'pump: loop {
        let mut guard = inbound.reserve(chunk).await;
        if guard.is_blocked() {
            break;
        }
        let region = guard.space(chunk);
        tokio::select! {
            biased;
            _ = close_signal.notified() => {
                drop(guard);
                break 'pump;
            }
            read = reader.read(region) => {
                match read {
                    Ok(0) => {
                        drop(guard);
                        break 'pump;
                    }
                    Ok(n) => {
                        guard.commit(n);
                        drop(guard);
                        if inbound.flush().await {
                            break 'pump;
                        }
                    }
                    Err(err) => {
                        drop(guard);
                        log::error!(target: &*log_target, "{}", Error::TransportRead(err));
                        break 'pump;
                    }
                }
            }
        }
    }
    inbound.close().await;
    outbound.close().await;
}

/// Drains the outbound pipe and writes each chunk to the transport's write
/// half until completion or a fatal write error. Owning the write half
/// outright (see [`crate::transport::Transport::split`]) means this loop
/// never has to wait on the fill loop to release a shared lock before it
/// can write or close.
///
/// A fatal write error also cancels the inbound pipe reader (cascading
/// shutdown into the parser driver, symmetric to how the fill loop closes
/// the outbound pipe writer on every one of its own exit paths) and wakes
/// the fill loop's read via `close_signal`, so a transport that can no
/// longer be written to is also treated as one the channel can no longer
/// usefully read from, rather than leaving the fill loop parked on a read
/// the peer may never answer. This loop shuts down its write half on every
/// exit path (canceled, normal completion, fatal write error), taking over
/// that responsibility from the fill loop now that the two halves are
/// owned independently.
async fn send_loop(
    mut writer: Box<dyn TransportWriter>,
    outbound: PipeReader,
    inbound_reader: PipeReader,
    close_signal: Arc<Notify>,
    log_target: Arc<str>,
) {
    loop {
        let guard = outbound.acquire().await;
        if guard.is_canceled() {
            drop(guard);
            outbound.complete().await;
            let _ = writer.close().await;
            return;
        }
        let is_completed = guard.is_completed();
        let buf = guard.buffer();
        let end = buf.len();

        if !buf.is_empty() {
            let result = writer.write(buf).await;
            if let Err(err) = result {
                log::error!(target: &*log_target, "{}", Error::TransportWrite(err));
                guard.advance(end, end);
                outbound.complete().await;
                inbound_reader.cancel().await;
                close_signal.notify_one();
                let _ = writer.close().await;
                return;
            }
        }

        guard.advance(end, end);
        if is_completed {
            outbound.complete().await;
            let _ = writer.close().await;
            return;
        }
    }
}
