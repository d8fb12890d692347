//! Error kinds surfaced across the channel's external interfaces.
//!
//! Internal failures on the fill/parser/send loops never reach the package
//! consumer as a `Result` — per the propagation policy, they are logged at
//! the point they terminate a loop, and the consumer only ever observes
//! closure as the package sequence ending. `Error` exists for the
//! operations that do report synchronously: `send_bytes`/`send_encoded`,
//! and channel/option construction.

use std::io;

/// Errors surfaced by the channel's external interfaces.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The transport failed on a read.
    #[error("transport read failed: {0}")]
    TransportRead(#[source] io::Error),

    /// The transport failed on a write.
    #[error("transport write failed: {0}")]
    TransportWrite(#[source] io::Error),

    /// A filter rejected the byte stream, or the driver detected a
    /// malformed sequence it cannot recover from.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A single package exceeded `max_package_length`.
    #[error("package exceeds max_package_length of {max_package_length} bytes")]
    OversizePackage { max_package_length: usize },

    /// A send was attempted after the channel started closing.
    #[error("channel is closed")]
    ChannelClosed,

    /// A `ChannelOptions` value was invalid.
    #[error("invalid channel option: {0}")]
    InvalidOption(String),
}
