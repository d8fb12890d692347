use std::io::{ErrorKind, Read};

use super::{PBufState, PipeBuf};

/// Producer reference to a [`PipeBuf`].
///
/// Obtained from [`PipeBuf::wr`]. Acts like a `&mut PipeBuf` restricted to
/// the operations a producer is allowed to perform.
pub struct PBufWr<'a> {
    pub(crate) pb: &'a mut PipeBuf,
}

impl<'a> PBufWr<'a> {
    /// Reborrow this reference with a shorter lifetime.
    #[inline(always)]
    pub fn reborrow<'b, 'r>(&'r mut self) -> PBufWr<'b>
    where
        'a: 'b,
        'r: 'b,
    {
        PBufWr { pb: self.pb }
    }

    /// Get a mutable slice of `reserve` free bytes to write into. The data
    /// written must be committed immediately with [`PBufWr::commit`]
    /// before any other call that might compact or grow the buffer.
    ///
    /// The returned bytes are not zeroed; they hold whatever was
    /// previously written to the buffer at that position.
    #[inline]
    #[track_caller]
    pub fn space(&mut self, reserve: usize) -> &mut [u8] {
        if self.pb.rd == self.pb.wr {
            self.pb.rd = 0;
            self.pb.wr = 0;
        }
        if self.pb.wr + reserve > self.pb.data.len() {
            self.make_space(reserve);
        }
        &mut self.pb.data[self.pb.wr..self.pb.wr + reserve]
    }

    #[inline(never)]
    #[cold]
    #[track_caller]
    fn make_space(&mut self, reserve: usize) {
        debug_assert!(self.pb.rd != self.pb.wr || self.pb.rd == 0);
        if self.pb.rd > 0 {
            self.pb.data.copy_within(self.pb.rd..self.pb.wr, 0);
            self.pb.wr -= self.pb.rd;
            self.pb.rd = 0;
        }
        if self.pb.wr + reserve > self.pb.data.len() {
            let cap = (self.pb.wr + reserve).max(reserve * 2);
            self.pb.data.reserve(cap - self.pb.data.len());
            self.pb.data.resize(self.pb.data.capacity(), 0);
        }
    }

    /// Commit `len` bytes, previously written into the slice returned by
    /// the immediately preceding [`PBufWr::space`] call, to the buffer.
    ///
    /// # Panics
    ///
    /// Panics if the pipe is already closed/aborted, or if `len` exceeds
    /// the space that was reserved.
    #[inline]
    #[track_caller]
    pub fn commit(&mut self, len: usize) {
        if self.is_eof() {
            panic_closed_pipebuf();
        }
        let wr = self.pb.wr + len;
        if wr > self.pb.data.len() {
            panic_commit_overflow();
        }
        self.pb.wr = wr;
    }

    /// Set the "push" state, asking the consumer to flush promptly.
    #[inline]
    pub fn push(&mut self) {
        if self.pb.state == PBufState::Open {
            self.pb.state = PBufState::Push;
        }
    }

    /// Append a slice of data in one call (space + copy + commit).
    #[inline]
    #[track_caller]
    pub fn append(&mut self, data: &[u8]) {
        let len = data.len();
        self.space(len).copy_from_slice(data);
        self.commit(len);
    }

    /// Whether EOF has already been indicated ([`PBufWr::close`] or
    /// [`PBufWr::abort`]).
    #[inline(always)]
    pub fn is_eof(&self) -> bool {
        !matches!(self.pb.state, PBufState::Open | PBufState::Push)
    }

    /// Indicate a normal end-of-file. Ignored if EOF was already
    /// indicated.
    #[inline]
    #[track_caller]
    pub fn close(&mut self) {
        if self.is_eof() {
            return;
        }
        self.pb.state = PBufState::Closing;
    }

    /// Indicate an abnormal end-of-file (the data may be incomplete).
    /// Ignored if EOF was already indicated.
    #[inline]
    #[track_caller]
    pub fn abort(&mut self) {
        if self.is_eof() {
            return;
        }
        self.pb.state = PBufState::Aborting;
    }

    /// Number of bytes currently buffered and not yet consumed.
    #[inline(always)]
    pub fn buffered_len(&self) -> usize {
        self.pb.wr - self.pb.rd
    }

    /// Input data from the given `Read` implementation, up to `len` bytes.
    /// If the source reports EOF (`Ok(0)`), a normal `Closing` EOF is set
    /// and no further reads are attempted. `Interrupted` is retried.
    pub fn input_from(&mut self, source: &mut impl Read, len: usize) -> std::io::Result<usize> {
        if self.is_eof() {
            return Ok(0);
        }
        let mut total = 0;
        while total < len {
            let space = self.space(len - total);
            match source.read(space) {
                Err(ref e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => return Err(e),
                Ok(0) => {
                    self.close();
                    return Ok(total);
                }
                Ok(count) => {
                    self.commit(count);
                    total += count;
                }
            }
        }
        Ok(total)
    }
}

impl<'a> std::io::Write for PBufWr<'a> {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.pb.write(data)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.pb.flush()
    }
}

#[inline(never)]
#[cold]
#[track_caller]
fn panic_closed_pipebuf() -> ! {
    panic!("Illegal to commit data to a closed PipeBuf");
}
#[inline(never)]
#[cold]
#[track_caller]
fn panic_commit_overflow() -> ! {
    panic!("Illegal to commit more bytes to a PipeBuf than the reserved space");
}
