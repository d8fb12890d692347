use std::io::{ErrorKind, Write};

use super::{PBufState, PipeBuf};

/// Consumer reference to a [`PipeBuf`].
///
/// Obtained from [`PipeBuf::rd`]. Acts like a `&mut PipeBuf` restricted to
/// the operations a consumer is allowed to perform.
pub struct PBufRd<'a> {
    pub(crate) pb: &'a mut PipeBuf,
}

impl<'a> PBufRd<'a> {
    /// Reborrow this reference with a shorter lifetime.
    #[inline(always)]
    pub fn reborrow<'b, 'r>(&'r mut self) -> PBufRd<'b>
    where
        'a: 'b,
        'r: 'b,
    {
        PBufRd { pb: self.pb }
    }

    /// The currently available (unconsumed) bytes.
    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.pb.data[self.pb.rd..self.pb.wr]
    }

    /// Mark `len` bytes as consumed from the start of the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `len` is greater than the number of bytes available.
    #[inline]
    #[track_caller]
    pub fn consume(&mut self, len: usize) {
        let rd = self.pb.rd + len;
        if rd > self.pb.wr {
            panic_consume_overflow();
        }
        self.pb.rd = rd;
    }

    /// Number of bytes currently held in the buffer.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.pb.wr - self.pb.rd
    }

    /// Whether the buffer currently holds no data.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.pb.rd == self.pb.wr
    }

    /// Try to consume a "push" indication. Returns `true` if one was
    /// present and has now been consumed.
    #[inline]
    pub fn consume_push(&mut self) -> bool {
        if self.pb.state == PBufState::Push {
            self.pb.state = PBufState::Open;
            true
        } else {
            false
        }
    }

    /// Try to consume an EOF indication, converting `Closing` to `Closed`
    /// and `Aborting` to `Aborted`. Returns `true` if an EOF was waiting
    /// and has now been consumed.
    #[inline]
    pub fn consume_eof(&mut self) -> bool {
        match self.pb.state {
            PBufState::Closing => {
                self.pb.state = PBufState::Closed;
                true
            }
            PBufState::Aborting => {
                self.pb.state = PBufState::Aborted;
                true
            }
            _ => false,
        }
    }

    /// Whether there is an EOF waiting to be consumed.
    #[inline]
    pub fn has_pending_eof(&self) -> bool {
        matches!(self.pb.state, PBufState::Closing | PBufState::Aborting)
    }

    /// Whether EOF has been indicated by the producer at all (consumed or
    /// not).
    #[inline]
    pub fn is_eof(&self) -> bool {
        !matches!(self.pb.state, PBufState::Open | PBufState::Push)
    }

    /// Whether the stream was aborted (`Aborting` or `Aborted`).
    #[inline]
    pub fn is_aborted(&self) -> bool {
        matches!(self.pb.state, PBufState::Aborting | PBufState::Aborted)
    }

    /// Whether an EOF has been consumed and (for a normal close) the
    /// buffer is drained.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.pb.is_done()
    }

    /// Current EOF/push state.
    #[inline(always)]
    pub fn state(&self) -> PBufState {
        self.pb.state
    }

    /// Output as much data as possible to the given `Write`
    /// implementation. A "push" state is converted into a `flush` call
    /// once the buffer has been emptied. Retries on `Interrupted`.
    #[track_caller]
    pub fn output_to(&mut self, sink: &mut impl Write, force_flush: bool) -> std::io::Result<()> {
        while !self.is_empty() {
            match sink.write(self.data()) {
                Err(ref e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => return Err(e),
                Ok(0) => break,
                Ok(len) => {
                    if len > self.len() {
                        panic!("Faulty Write implementation consumed more data than it was given");
                    }
                    self.consume(len);
                }
            }
        }
        if self.consume_push() || force_flush {
            loop {
                match sink.flush() {
                    Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                    Ok(()) => break,
                }
            }
        }
        Ok(())
    }
}

impl<'a> std::io::Read for PBufRd<'a> {
    fn read(&mut self, data: &mut [u8]) -> std::io::Result<usize> {
        self.pb.read(data)
    }
}

#[inline(never)]
#[cold]
#[track_caller]
fn panic_consume_overflow() -> ! {
    panic!("Illegal to consume more PipeBuf bytes than are available");
}
