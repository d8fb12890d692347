//! The stream-shaped transport the fill/send loops read from and write to.
//!
//! A [`Transport`] is split at [`crate::channel::Channel::new`] into an
//! independently-owned [`TransportReader`] half and [`TransportWriter`] half
//! — one per direction — so the fill loop and the send loop never contend on
//! a shared lock: each loop owns its half outright for the lifetime of the
//! task, exactly the way a socket's read/write halves are owned once split.
//! Blanket-implemented for anything that is `AsyncRead + AsyncWrite + Unpin
//! + Send`: `TcpStream`, `UnixStream`, the halves of `tokio::io::duplex`
//! used in tests, or any other byte stream an embedding application hands
//! in. Opening/accepting the underlying socket is explicitly out of scope
//! for this crate.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

/// The read half of a split [`Transport`], owned exclusively by the fill
/// loop.
#[async_trait::async_trait]
pub trait TransportReader: Send {
    /// Read into `buf`, returning the number of bytes read. `0` means EOF.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// The write half of a split [`Transport`], owned exclusively by the send
/// loop.
#[async_trait::async_trait]
pub trait TransportWriter: Send {
    /// Write all of `buf`.
    async fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Flush any buffered writes.
    async fn flush(&mut self) -> io::Result<()>;

    /// Shut down the write half, signaling EOF to the peer.
    async fn close(&mut self) -> io::Result<()>;
}

/// A duplex byte-stream transport.
///
/// A blanket implementation covers every `AsyncRead + AsyncWrite + Unpin +
/// Send + 'static` type via [`tokio::io::split`], so this trait rarely needs
/// implementing directly; a custom implementation (e.g. wrapping a
/// non-stream adapter such as a datagram or TLS socket) need only produce a
/// reader/writer pair that never share state requiring a lock between them.
pub trait Transport: Send {
    type Reader: TransportReader + 'static;
    type Writer: TransportWriter + 'static;

    /// Split into independently-owned read/write halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// [`TransportReader`] wrapper around any `AsyncRead` half.
pub struct SplitReader<R>(R);

/// [`TransportWriter`] wrapper around any `AsyncWrite` half.
pub struct SplitWriter<W>(W);

#[async_trait::async_trait]
impl<R: AsyncRead + Unpin + Send> TransportReader for SplitReader<R> {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        AsyncReadExt::read(&mut self.0, buf).await
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> TransportWriter for SplitWriter<W> {
    async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(&mut self.0, buf).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(&mut self.0).await
    }

    async fn close(&mut self) -> io::Result<()> {
        AsyncWriteExt::shutdown(&mut self.0).await
    }
}

impl<T> Transport for T
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Reader = SplitReader<ReadHalf<T>>;
    type Writer = SplitWriter<WriteHalf<T>>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (r, w) = tokio::io::split(self);
        (SplitReader(r), SplitWriter(w))
    }
}
