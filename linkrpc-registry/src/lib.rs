//! HTTP service registry, discovery, and a discovery-backed client for the
//! linkrpc protocol.
//!
//! ## Modules
//!
//! - [`registry`]: the registry HTTP service (`/register`, `/lookup`)
//! - [`discovery`]: polls the registry and picks an address per call
//! - [`xclient`]: dials a fresh connection per call via a [`discovery::Discovery`]
//! - [`error`]: this crate's error type

pub mod discovery;
pub mod error;
pub mod registry;
pub mod xclient;

pub use discovery::{Discovery, FirstResultDiscovery, RoundRobinDiscovery};
pub use error::{Error, Result};
pub use registry::{Registry, ServerItem};
pub use xclient::XClient;
