//! Asynchronous wrapper around [`crate::buf::PipeBuf`].
//!
//! [`PipeBuf`]/[`PBufRd`]/[`PBufWr`] give us a synchronous, single-threaded
//! byte-pipe with explicit `space`/`commit`/`data`/`consume` calls. A
//! [`Channel`](crate::channel::Channel) needs that same contract but shared
//! between two independently-scheduled `tokio` tasks (one per direction),
//! with suspend points at "no room to write" and "no data to read yet".
//! [`Pipe`] adds exactly that: an `Arc<Mutex<..>>` around the buffer and a
//! pair of [`Notify`]s, one per direction of flow.
//!
//! The `examined` cursor recorded alongside `consumed` (see
//! [`ReadGuard::advance`]) means a reader that looked at the whole buffer
//! and decided it needed more data is not woken again until bytes actually
//! arrive past what it already examined — the same purpose as a tripwire in
//! the teacher crate's change-detection story, but anchored to what the
//! *reader* has seen rather than to every single producer action.

use std::sync::Arc;

use bytes::buf::UninitSlice;
use bytes::BufMut;
use tokio::sync::{Mutex, MutexGuard, Notify};

use crate::buf::{PBufState, PipeBuf};

const DEFAULT_ENCODE_CHUNK: usize = 256;

struct Inner {
    buf: PipeBuf,
    capacity: usize,
    examined: usize,
    /// Set by [`PipeReader::cancel`]: the reader has been asked to stop
    /// promptly, independent of EOF.
    canceled: bool,
    /// Set by [`PipeReader::complete`]: the reader has exited and the
    /// writer side should fail fast rather than block.
    reader_closed: bool,
}

impl Inner {
    /// Whether a producer should stop: the reader has gone away (canceled
    /// or completed), or the pipe already has an EOF recorded — including
    /// one the writer itself set, e.g. via the fill loop's shutdown cascade
    /// (see `Channel`'s fill loop, which closes both pipe writers on every
    /// exit path). `commit`/`append` on an already-EOF `PipeBuf` panics, so
    /// this must be checked before handing out a `WriteGuard`.
    fn writer_blocked(&self) -> bool {
        self.canceled
            || self.reader_closed
            || !matches!(self.buf.state(), PBufState::Open | PBufState::Push)
    }
}

/// Create a new asynchronous byte pipe with the given soft capacity bound
/// (in bytes). The bound throttles [`PipeWriter::reserve`], providing the
/// backpressure described in the channel's concurrency model.
pub fn channel(capacity: usize) -> (PipeWriter, PipeReader) {
    let inner = Arc::new(Mutex::new(Inner {
        buf: PipeBuf::with_capacity(capacity.max(64)),
        capacity,
        examined: 0,
        canceled: false,
        reader_closed: false,
    }));
    let data_ready = Arc::new(Notify::new());
    let space_ready = Arc::new(Notify::new());
    (
        PipeWriter {
            inner: inner.clone(),
            data_ready: data_ready.clone(),
            space_ready: space_ready.clone(),
        },
        PipeReader {
            inner,
            data_ready,
            space_ready,
        },
    )
}

/// Producer half of a [`Pipe`](channel).
#[derive(Clone)]
pub struct PipeWriter {
    inner: Arc<Mutex<Inner>>,
    data_ready: Arc<Notify>,
    space_ready: Arc<Notify>,
}

impl PipeWriter {
    /// Wait until at least `min_len` bytes of free space are available (or
    /// the reader has gone away), then return a guard exposing that space.
    pub async fn reserve(&self, min_len: usize) -> WriteGuard<'_> {
        loop {
            let notified = self.space_ready.notified();
            {
                let guard = self.inner.lock().await;
                let buffered = guard.buf.wr - guard.buf.rd;
                let room = guard.capacity.saturating_sub(buffered);
                if guard.writer_blocked() || room >= min_len {
                    return WriteGuard {
                        guard,
                        data_ready: &self.data_ready,
                        chunk_hint: min_len.max(DEFAULT_ENCODE_CHUNK),
                    };
                }
            }
            notified.await;
        }
    }

    /// Write `data` verbatim, waiting for room if necessary. A zero-length
    /// write always succeeds immediately without touching the buffer.
    pub async fn write_all(&self, data: &[u8]) -> bool {
        if data.is_empty() {
            return true;
        }
        let mut guard = self.reserve(data.len()).await;
        if guard.is_blocked() {
            return false;
        }
        guard.space(data.len()).copy_from_slice(data);
        guard.commit(data.len());
        true
    }

    /// Set the "push" state, asking the send/fill loop to deliver promptly.
    /// Returns `true` if the reader side has gone away and the caller
    /// should stop producing.
    pub async fn flush(&self) -> bool {
        let mut guard = self.inner.lock().await;
        guard.buf.wr().push();
        let blocked = guard.writer_blocked();
        drop(guard);
        self.data_ready.notify_waiters();
        blocked
    }

    /// Indicate a normal end-of-file.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        guard.buf.wr().close();
        drop(guard);
        self.data_ready.notify_waiters();
    }

    /// Indicate an abnormal end-of-file.
    pub async fn abort(&self) {
        let mut guard = self.inner.lock().await;
        guard.buf.wr().abort();
        drop(guard);
        self.data_ready.notify_waiters();
    }
}

/// A reserved, writable region of the pipe buffer, borrowed for the
/// duration of a single producer step. Dropping it wakes the reader.
pub struct WriteGuard<'a> {
    guard: MutexGuard<'a, Inner>,
    data_ready: &'a Notify,
    chunk_hint: usize,
}

impl<'a> WriteGuard<'a> {
    /// Whether the reader side has gone away; the caller should discard
    /// this guard without writing.
    pub fn is_blocked(&self) -> bool {
        self.guard.writer_blocked()
    }

    /// The reserved writable region (at least as large as the `min_len`
    /// passed to [`PipeWriter::reserve`]).
    pub fn space(&mut self, len: usize) -> &mut [u8] {
        self.guard.buf.wr().space(len)
    }

    /// Commit `len` bytes written into the slice from [`WriteGuard::space`].
    pub fn commit(&mut self, len: usize) {
        self.guard.buf.wr().commit(len);
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.data_ready.notify_waiters();
    }
}

/// # Safety
///
/// `chunk_mut` always returns a freshly reserved, uninitialised region of
/// at least one byte obtained directly from the underlying buffer, so the
/// standard `BufMut` safety contract holds.
unsafe impl BufMut for WriteGuard<'_> {
    fn remaining_mut(&self) -> usize {
        // The backing `Vec<u8>` grows on demand; there is no hard ceiling
        // visible from here (capacity backpressure is enforced once, up
        // front, by `PipeWriter::reserve`).
        usize::MAX / 2
    }

    unsafe fn advance_mut(&mut self, cnt: usize) {
        self.guard.buf.wr().commit(cnt);
    }

    fn chunk_mut(&mut self) -> &mut UninitSlice {
        let hint = self.chunk_hint;
        let space = self.guard.buf.wr().space(hint);
        UninitSlice::new(space)
    }
}

/// Consumer half of a [`Pipe`](channel).
#[derive(Clone)]
pub struct PipeReader {
    inner: Arc<Mutex<Inner>>,
    data_ready: Arc<Notify>,
    space_ready: Arc<Notify>,
}

impl PipeReader {
    /// Wait until there is unexamined data, a pending EOF, or a
    /// cancellation, then return a guard over the current buffer contents.
    pub async fn acquire(&self) -> ReadGuard<'_> {
        loop {
            let notified = self.data_ready.notified();
            {
                let guard = self.inner.lock().await;
                let available = guard.buf.wr - guard.buf.rd;
                if guard.canceled || guard.buf.rd().has_pending_eof() || available > guard.examined
                {
                    return ReadGuard {
                        guard,
                        space_ready: &self.space_ready,
                    };
                }
            }
            notified.await;
        }
    }

    /// Tell the producer side that this reader will not consume any more
    /// data, unblocking any pending [`PipeWriter::reserve`]/[`PipeWriter::flush`].
    pub async fn complete(&self) {
        let mut guard = self.inner.lock().await;
        guard.reader_closed = true;
        drop(guard);
        self.space_ready.notify_waiters();
    }

    /// Request prompt cancellation: the next (or current) [`Self::acquire`]
    /// resolves immediately with `is_canceled() == true`.
    pub async fn cancel(&self) {
        let mut guard = self.inner.lock().await;
        guard.canceled = true;
        drop(guard);
        self.data_ready.notify_waiters();
        self.space_ready.notify_waiters();
    }
}

/// A view of the currently buffered, unconsumed bytes, borrowed for the
/// duration of a single consumer step. Dropping it wakes the writer.
pub struct ReadGuard<'a> {
    guard: MutexGuard<'a, Inner>,
    space_ready: &'a Notify,
}

impl<'a> ReadGuard<'a> {
    /// The currently buffered, unconsumed bytes (always one contiguous
    /// segment for this pipe's storage engine).
    pub fn buffer(&self) -> &[u8] {
        self.guard.buf.rd().data()
    }

    /// Whether the producer has indicated end-of-file (normal or
    /// aborted), regardless of whether it has been consumed yet.
    pub fn is_completed(&self) -> bool {
        self.guard.buf.rd().is_eof()
    }

    /// Whether the producer's EOF was an abort.
    pub fn is_aborted(&self) -> bool {
        self.guard.buf.rd().is_aborted()
    }

    /// Whether cancellation was requested via [`PipeReader::cancel`].
    pub fn is_canceled(&self) -> bool {
        self.guard.canceled
    }

    /// Report how much of the buffer was consumed and how much was
    /// examined, per the pipe's `(consumed, examined)` contract. `examined`
    /// must be `>= consumed`.
    pub fn advance(mut self, consumed: usize, examined: usize) {
        debug_assert!(examined >= consumed);
        self.guard.buf.rd().consume_eof();
        self.guard.buf.rd().consume(consumed);
        self.guard.examined = examined.saturating_sub(consumed);
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.space_ready.notify_waiters();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let (wr, rd) = channel(64);
        assert!(wr.write_all(b"hello").await);
        let guard = rd.acquire().await;
        assert_eq!(guard.buffer(), b"hello");
        guard.advance(5, 5);
    }

    #[tokio::test]
    async fn examined_without_consume_does_not_rewake_on_same_bytes() {
        let (wr, rd) = channel(64);
        wr.write_all(b"partial").await;
        let guard = rd.acquire().await;
        assert_eq!(guard.buffer(), b"partial");
        guard.advance(0, 7);

        // No new bytes arrived, so a fresh acquire must not return until
        // more data (or EOF/cancel) shows up. Race it against a timeout.
        let acquire = rd.acquire();
        tokio::pin!(acquire);
        tokio::select! {
            _ = &mut acquire => panic!("acquire resolved with no new data past what was examined"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {}
        }
    }

    #[tokio::test]
    async fn close_cascades_to_writer_blocked_without_panicking() {
        let (wr, rd) = channel(64);
        wr.close().await;
        // Writing after the pipe's own EOF must report blocked rather than
        // panic inside `PBufWr::commit` (a writer unaware its own prior
        // `close()` already ran, e.g. the fill loop's shutdown cascade).
        assert!(!wr.write_all(b"too late").await);

        let guard = rd.acquire().await;
        assert!(guard.is_completed());
        assert!(!guard.is_aborted());
    }

    #[tokio::test]
    async fn cancel_unblocks_pending_reader_and_writer() {
        let (wr, rd) = channel(4);
        rd.cancel().await;
        let guard = rd.acquire().await;
        assert!(guard.is_canceled());
        drop(guard);

        assert!(!wr.write_all(b"x").await);
    }

    #[tokio::test]
    async fn reader_complete_unblocks_writer_reserve() {
        let (wr, rd) = channel(4);
        rd.complete().await;
        assert!(!wr.write_all(b"x").await);
    }

    #[tokio::test]
    async fn zero_length_write_is_a_no_op() {
        let (wr, _rd) = channel(4);
        assert!(wr.write_all(&[]).await);
    }
}
