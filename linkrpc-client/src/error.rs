//! Client-side error type.

use thiserror::Error;

/// Client-side error variants.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] linkrpc_core::Error),

    /// The method the registered handler returned, or the server's
    /// "method not found" response, reported back on the response's
    /// `Error` field.
    #[error("rpc error: {0}")]
    Remote(String),

    /// A call was made (or was pending) after the client's input loop
    /// exited, either because `Client::close` was called or the connection died.
    #[error("client is shut down: {0}")]
    Shutdown(String),
}

impl Error {
    /// True if this error ended the whole connection (as opposed to being
    /// scoped to one call).
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            Error::Core(e) => e.is_connection_fatal(),
            Error::Remote(_) => false,
            Error::Shutdown(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
