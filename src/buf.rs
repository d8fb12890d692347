//! Single-buffer byte-pipe storage.
//!
//! This is the synchronous storage engine underneath [`crate::pipe::Pipe`].
//! It is a close relative of the `pipebuf` crate's own `PipeBuf`: a single
//! growable contiguous buffer shared between a producer (writer) and a
//! consumer (reader), who each see only the half of the API appropriate to
//! them via [`PBufRd`]/[`PBufWr`].

use std::io::{ErrorKind, Read, Write};

use super::{PBufRd, PBufWr};

/// Byte-pipe storage shared between one producer and one consumer.
///
/// Use [`PipeBuf::rd`] to get a consumer reference, and [`PipeBuf::wr`] to
/// get a producer reference. Neither reference costs more than a `&mut
/// PipeBuf`.
pub struct PipeBuf {
    pub(crate) data: Vec<u8>,
    pub(crate) rd: usize,
    pub(crate) wr: usize,
    pub(crate) state: PBufState,
}

impl PipeBuf {
    /// Create a new empty pipe buffer.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            rd: 0,
            wr: 0,
            state: PBufState::Open,
        }
    }

    /// Create a new pipe buffer with the given initial capacity.
    #[inline]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            data: vec![0; cap],
            rd: 0,
            wr: 0,
            state: PBufState::Open,
        }
    }

    /// Reset the buffer to its initial state (`Open` and empty). The
    /// backing memory is not zeroed.
    #[inline]
    pub fn reset(&mut self) {
        self.rd = 0;
        self.wr = 0;
        self.state = PBufState::Open;
    }

    /// Get a consumer reference to the buffer.
    #[inline(always)]
    pub fn rd(&mut self) -> PBufRd<'_> {
        PBufRd { pb: self }
    }

    /// Get a producer reference to the buffer.
    #[inline(always)]
    pub fn wr(&mut self) -> PBufWr<'_> {
        PBufWr { pb: self }
    }

    /// Get the current EOF/push state of the buffer.
    #[inline(always)]
    pub fn state(&self) -> PBufState {
        self.state
    }

    /// Test whether the "push" state is set, without changing it.
    #[inline(always)]
    pub fn is_push(&self) -> bool {
        self.state == PBufState::Push
    }

    /// Test whether an EOF has been indicated and consumed, and (for a
    /// normal close) that the buffer is empty. Means processing is
    /// complete.
    #[inline]
    pub fn is_done(&self) -> bool {
        match self.state {
            PBufState::Aborted => true,
            PBufState::Closed => self.rd == self.wr,
            _ => false,
        }
    }
}

impl Read for PipeBuf {
    /// - `Ok(len)`: some data was read
    /// - `Ok(0)`: successful end-of-file
    /// - `Err(WouldBlock)`: no data available right now
    /// - `Err(ConnectionAborted)`: aborted end-of-file
    fn read(&mut self, data: &mut [u8]) -> std::io::Result<usize> {
        let mut rd = self.rd();
        if !rd.is_empty() {
            let slice = rd.data();
            let len = slice.len().min(data.len());
            data[..len].copy_from_slice(&slice[..len]);
            rd.consume(len);
            Ok(len)
        } else if rd.consume_eof() {
            if rd.is_aborted() {
                Err(ErrorKind::ConnectionAborted.into())
            } else {
                Ok(0)
            }
        } else {
            Err(ErrorKind::WouldBlock.into())
        }
    }
}

impl Write for PipeBuf {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let mut wr = self.wr();
        let len = data.len();
        wr.space(len).copy_from_slice(data);
        wr.commit(len);
        Ok(len)
    }

    /// Sets the "push" state on the buffer.
    fn flush(&mut self) -> std::io::Result<()> {
        self.wr().push();
        Ok(())
    }
}

impl Default for PipeBuf {
    fn default() -> Self {
        Self::new()
    }
}

/// End-of-file and "push" state of a [`PipeBuf`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PBufState {
    /// End-of-file has not been reached yet. More data may follow.
    Open,
    /// Open, with the producer requesting the consumer flush promptly.
    Push,
    /// The producer has reported a successful end-of-file, not yet
    /// consumed. Whatever data remains in the buffer is the final data.
    Closing,
    /// Successful end-of-file, reported and consumed.
    Closed,
    /// The producer has reported an abnormal end-of-file, not yet
    /// consumed. Buffered data may be incomplete.
    Aborting,
    /// Abnormal end-of-file, reported and consumed.
    Aborted,
}
