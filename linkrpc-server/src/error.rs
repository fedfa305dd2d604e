//! Server-side error type.
//!
//! Wraps [`linkrpc_core::Error`] with the two failure modes that only make
//! sense once a service registry and dispatcher exist: registering a
//! duplicate or invalid service, and dispatching to an unknown method.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] linkrpc_core::Error),

    /// `register`/`register_name` was called with a service name already
    /// present in the registry.
    #[error("service already registered: {0}")]
    DuplicateService(String),

    /// A service was registered with no eligible methods.
    #[error("service has no eligible methods: {0}")]
    NoMethods(String),

    /// A request's `ServiceMethod` did not resolve to `Service.Method`, or
    /// named a service/method the registry doesn't know about.
    #[error("method {0} not found")]
    MethodNotFound(String),
}

impl Error {
    /// True if this error is fatal to the owning connection as opposed to
    /// scoped to a single request (an unknown method is reported back to
    /// the caller as a normal RPC error, not a torn-down connection).
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            Error::Core(e) => e.is_connection_fatal(),
            Error::DuplicateService(_) | Error::NoMethods(_) | Error::MethodNotFound(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
