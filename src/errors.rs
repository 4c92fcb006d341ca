//! Library error types. Application code wraps these in `anyhow`.

use thiserror::Error;

/// An error decoding a response frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Frame ended before a field the record type requires.
    #[error("frame truncated: {len} bytes, need at least {needed}")]
    Truncated { len: usize, needed: usize },
    /// Record offset no longer fits the one-byte offset field.
    #[error("record offset {0} out of range")]
    RecordTooLong(usize),
}

/// An error handing a request to the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint side of the channel has gone away.
    #[error("transport closed")]
    Closed,
}
