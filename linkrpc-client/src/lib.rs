//! Multiplexing client for the linkrpc protocol.
//!
//! ## Modules
//!
//! - [`error`]: client-side error type
//! - [`client`]: the connected [`Client`] and its background input loop

pub mod client;
pub mod error;

pub use client::{Client, PendingCall};
pub use error::{Error, Result};
