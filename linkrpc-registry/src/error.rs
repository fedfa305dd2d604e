//! Registry/discovery/XClient error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] linkrpc_client::Error),

    #[error(transparent)]
    Core(#[from] linkrpc_core::Error),

    #[error("http error talking to registry: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry has no servers for service {0}")]
    NoServers(String),

    #[error("connecting to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
