//! Core wire protocol types shared by the `linkrpc-server` and
//! `linkrpc-client` crates.
//!
//! ## Modules
//!
//! - [`error`]: wire-level error type shared across the whole protocol
//! - [`frame`]: request/response header framing
//! - [`serialize`]: body serializer trait and the JSON implementation
//! - [`compress`]: body compressor trait and the raw/gzip implementations
//! - [`codec`]: client/server codecs composing framing with compression
//! - [`preamble`]: the JSON `Options` handshake sent once per connection

pub mod codec;
pub mod compress;
pub mod error;
pub mod frame;
pub mod preamble;
pub mod serialize;

pub use codec::{ClientCodec, ReadRequestError, ServerCodec};
pub use compress::{BoxedCompressor, Compressor, GzipCompressor, RawCompressor};
pub use error::{Error, Result};
pub use frame::{HeaderPool, RequestHeader, ResponseHeader, HEADER_SIZE};
pub use preamble::Options;
pub use serialize::{JsonSerializer, Serializer, SerializerKind};
