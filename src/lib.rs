//! Pipelined duplex byte channel for packet-oriented stream servers.
//!
//! A [`Channel`] owns one full-duplex byte transport (anything implementing
//! [`tokio::io::AsyncRead`] + [`tokio::io::AsyncWrite`], e.g. a `TcpStream`)
//! and converts its raw byte stream into a lazy sequence of typed packages,
//! while serializing outbound packages/bytes back onto the same transport.
//!
//! ```text
//! transport -> InboundPipe -> parser driver -> PackageQueue -> application
//! application -> Sender -> OutboundPipe -> transport
//! ```
//!
//! The hard parts live in three places:
//!
//! - [`pipe`] — an in-memory, backpressured byte pipe shared between an I/O
//!   loop and either the parser driver or a sender, with explicit
//!   `(consumed, examined)` reader semantics so a reader that has looked at
//!   everything currently buffered and decided it needs more isn't woken
//!   again until new bytes actually arrive.
//! - [`filter`]/[`driver`] — the [`PipelineFilter`] contract protocol authors
//!   implement, and the driver that feeds it buffered bytes, handles
//!   protocol-mode handoffs, and enforces `max_package_length`.
//! - [`channel`] — the fill/parser/send loops, their cascaded shutdown, and
//!   the `Created -> Running -> Closing -> Closed` lifecycle.
//!
//! # Example
//!
//! ```no_run
//! use pipelane::{Channel, ChannelBuilder, PipelineFilter, SeqReader};
//!
//! struct Lines;
//!
//! impl PipelineFilter<String> for Lines {
//!     type Context = ();
//!
//!     fn filter(&mut self, reader: &mut SeqReader<'_>) -> Option<String> {
//!         let idx = reader.find(b'\n')?;
//!         let line = String::from_utf8_lossy(&reader.remaining()[..idx]).into_owned();
//!         reader.advance(idx + 1);
//!         Some(line)
//!     }
//! }
//!
//! # async fn run(stream: tokio::net::TcpStream) {
//! let options = ChannelBuilder::new().build().unwrap();
//! let filter: Box<dyn PipelineFilter<String, Context = ()>> = Box::new(Lines);
//! let channel = Channel::new(stream, filter, options);
//! let sender = channel.sender();
//! let (mut packages, mut handle) = channel.run();
//! while let Some(line) = packages.next().await {
//!     let _ = sender.send_bytes(line.as_bytes()).await;
//! }
//! handle.wait_closed().await;
//! # }
//! ```

#![forbid(unsafe_code)]

mod buf;
pub use buf::{PBufState, PipeBuf};

mod wr;
pub use wr::PBufWr;

mod rd;
pub use rd::PBufRd;

mod pipe;
pub use pipe::{channel as pipe_channel, PipeReader, PipeWriter};

mod filter;
pub use filter::{PipelineFilter, SeqReader};

mod driver;

mod queue;
pub use queue::PackageStream;

mod encoder;
pub use encoder::PackageEncoder;

mod transport;
pub use transport::{Transport, TransportReader, TransportWriter};

mod options;
pub use options::{ChannelBuilder, ChannelOptions};

mod error;
pub use error::Error;

mod channel;
pub use channel::{Channel, ChannelHandle, ChannelState, Sender};
