//! Compressor trait and implementations for body compression.
//!
//! Adapted from the `Codec` trait shape in the connect codec: a
//! small `name`/`compress`/`decompress` trio, plus a boxed, type-erased
//! wrapper for storage in a registry keyed by the wire `compress_type` id
//! rather than a content-encoding string.

use std::io::{Read, Write};
use std::sync::Arc;

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzipLevel;

use crate::error::{Error, Result};

/// The wire id for "no compression". Carried in every request/response
/// header's `CompressType` field. `0` is reserved (invalid/unset), mirroring
/// `compress.Invalid` sitting ahead of `Raw`/`Gzip` in the enum it's
/// adapted from.
pub const RAW: u16 = 1;
/// The wire id for gzip compression.
pub const GZIP: u16 = 2;

/// Compresses/decompresses RPC bodies.
pub trait Compressor: Send + Sync + 'static {
    /// The wire id for this compressor, carried in the header's
    /// `CompressType` field.
    fn id(&self) -> u16;

    /// Compress a body.
    fn zip(&self, data: &[u8]) -> Result<Bytes>;

    /// Decompress a body.
    fn unzip(&self, data: &[u8]) -> Result<Bytes>;
}

/// A type-erased, cheaply cloneable compressor handle.
#[derive(Clone)]
pub struct BoxedCompressor(Arc<dyn Compressor>);

impl BoxedCompressor {
    pub fn new<C: Compressor>(compressor: C) -> Self {
        BoxedCompressor(Arc::new(compressor))
    }

    pub fn id(&self) -> u16 {
        self.0.id()
    }

    pub fn zip(&self, data: &[u8]) -> Result<Bytes> {
        self.0.zip(data)
    }

    pub fn unzip(&self, data: &[u8]) -> Result<Bytes> {
        self.0.unzip(data)
    }
}

impl std::fmt::Debug for BoxedCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BoxedCompressor").field(&self.id()).finish()
    }
}

/// No-op compressor. Identity passthrough.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCompressor;

impl Compressor for RawCompressor {
    fn id(&self) -> u16 {
        RAW
    }

    fn zip(&self, data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }

    fn unzip(&self, data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }
}

/// Gzip compressor (`flate2`).
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    /// Compression level, 0 (none) to 9 (best).
    pub level: u32,
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipCompressor {
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Compressor for GzipCompressor {
    fn id(&self) -> u16 {
        GZIP
    }

    fn zip(&self, data: &[u8]) -> Result<Bytes> {
        let mut encoder = GzEncoder::new(Vec::new(), GzipLevel::new(self.level));
        encoder
            .write_all(data)
            .map_err(|e| Error::Compress(e.to_string()))?;
        let out = encoder.finish().map_err(|e| Error::Compress(e.to_string()))?;
        Ok(Bytes::from(out))
    }

    fn unzip(&self, data: &[u8]) -> Result<Bytes> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::Compress(e.to_string()))?;
        Ok(Bytes::from(out))
    }
}

/// Look up a compressor by its wire id. Returns [`Error::Protocol`] for
/// unrecognized ids.
pub fn lookup(compress_type: u16) -> Result<BoxedCompressor> {
    match compress_type {
        RAW => Ok(BoxedCompressor::new(RawCompressor)),
        GZIP => Ok(BoxedCompressor::new(GzipCompressor::default())),
        other => Err(Error::Protocol(format!(
            "unknown compress_type {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_compressor_is_identity() {
        let c = RawCompressor;
        let original = b"hello world";
        let zipped = c.zip(original).unwrap();
        assert_eq!(&zipped[..], &original[..]);
        let unzipped = c.unzip(&zipped).unwrap();
        assert_eq!(&unzipped[..], &original[..]);
    }

    #[test]
    fn gzip_round_trip() {
        let c = GzipCompressor::default();
        let original = b"hello world, this is a somewhat longer payload to compress";
        let zipped = c.zip(original).unwrap();
        assert_ne!(&zipped[..], &original[..]);
        let unzipped = c.unzip(&zipped).unwrap();
        assert_eq!(&unzipped[..], &original[..]);
    }

    #[test]
    fn gzip_decompress_invalid_data_errors() {
        let c = GzipCompressor::default();
        let err = c.unzip(b"not gzip").unwrap_err();
        assert!(matches!(err, Error::Compress(_)));
    }

    #[test]
    fn lookup_unknown_id_is_protocol_error() {
        let err = lookup(99).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn lookup_known_ids() {
        assert_eq!(lookup(RAW).unwrap().id(), RAW);
        assert_eq!(lookup(GZIP).unwrap().id(), GZIP);
    }
}
