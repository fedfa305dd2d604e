//! Dispatcher and accept loop for the linkrpc protocol.
//!
//! A [`Server`] owns a [`ServiceMap`]: register services with
//! [`ServiceBuilder`], then call [`Server::accept`] (or the [`serve`]
//! convenience function) to start handling connections.
//!
//! ## Modules
//!
//! - [`error`]: server-side error type
//! - [`service`]: the service registry ([`ServiceMap`], [`ServiceBuilder`])
//! - [`dispatcher`]: the accept loop and per-connection serve loop

pub mod dispatcher;
pub mod error;
pub mod service;

pub use dispatcher::{serve, serve_connection, Server};
pub use error::{Error, Result};
pub use service::{MethodHandler, ServiceBuilder, ServiceMap};
