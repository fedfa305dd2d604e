//! Wire-level error types shared by the server and client crates.
//!
//! This module provides [`Error`], the error type for everything that can go
//! wrong below the dispatch layer: framing, serialization, and compression.
//! Server- and client-specific errors (registration, dispatch, method,
//! shutdown) live in their own crates and wrap this type.

use std::io;

/// Wire-level error variants.
///
/// `transport` and `framing` errors are fatal to the connection that
/// produced them; nothing here is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying I/O failure (socket read/write, EOF mid-frame).
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Header or body length did not match what was declared on the wire.
    #[error("framing error: {0}")]
    Framing(String),

    /// Unknown compressor id, unknown serializer kind, or malformed preamble.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serializer marshal/unmarshal failure.
    #[error("serialize error: {0}")]
    Serialize(String),

    /// Compressor zip/unzip failure.
    #[error("compress error: {0}")]
    Compress(String),
}

impl Error {
    /// Build a [`Error::Framing`] from a short-read description.
    pub fn short_read(context: &str, expected: usize, actual: usize) -> Self {
        Error::Framing(format!(
            "{context}: expected {expected} bytes, got {actual}"
        ))
    }

    /// True if this error is fatal to the owning connection (transport or
    /// framing) as opposed to scoped to a single call.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Framing(_))
    }
}

/// Convenience alias used throughout `linkrpc-core`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_framing_are_connection_fatal() {
        let io_err = Error::Transport(io::Error::other("boom"));
        assert!(io_err.is_connection_fatal());

        let framing_err = Error::short_read("header", 16, 4);
        assert!(framing_err.is_connection_fatal());
        assert_eq!(
            framing_err.to_string(),
            "framing error: header: expected 16 bytes, got 4"
        );
    }

    #[test]
    fn protocol_and_method_errors_are_not_connection_fatal() {
        assert!(!Error::Protocol("unknown seq".into()).is_connection_fatal());
        assert!(!Error::Serialize("bad json".into()).is_connection_fatal());
        assert!(!Error::Compress("bad gzip".into()).is_connection_fatal());
    }
}
