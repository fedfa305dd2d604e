//! Request/response header framing.
//!
//! The wire layout is fixed and length-prefixed. Both headers place a
//! `u16` length field first so the variable-length trailing field
//! (`ServiceMethod` or `Error`) can be sized before it is read, without
//! ever double-consuming bytes from the stream.
//!
//! ```text
//! RequestHeader:  MethodLen:u16 CompressType:u16 BodyLen:u32 Seq:u64 ServiceMethod:[u8; MethodLen]
//! ResponseHeader: ErrorLen:u16  CompressType:u16 BodyLen:u32 Seq:u64 Error:[u8; ErrorLen]
//! ```

use std::sync::Mutex;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Size, in bytes, of the fixed portion of either header (everything before
/// the variable-length trailing field).
pub const HEADER_SIZE: usize = 16;

/// A decoded request header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeader {
    pub compress_type: u16,
    pub body_len: u32,
    pub seq: u64,
    pub service_method: String,
}

impl RequestHeader {
    /// Peek the leading `MethodLen` field, then read and decode the full
    /// header (fixed portion + `ServiceMethod`) from a buffered reader.
    ///
    /// Fails with [`Error::Transport`] on I/O error, or
    /// [`Error::Framing`] if fewer bytes than declared are available before
    /// the stream ends.
    pub async fn read<R: AsyncBufRead + Unpin>(r: &mut R) -> Result<Self> {
        let method_len = peek_u16(r).await?;
        let total = HEADER_SIZE + method_len as usize;
        let mut data = vec![0u8; total];
        read_exact_or_short(r, &mut data, "RequestHeader").await?;

        let compress_type = u16::from_be_bytes([data[2], data[3]]);
        let body_len = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let seq = u64::from_be_bytes(data[8..16].try_into().unwrap());
        let service_method = String::from_utf8_lossy(&data[16..]).into_owned();

        Ok(RequestHeader {
            compress_type,
            body_len,
            seq,
            service_method,
        })
    }

    /// Encode and write the header, then flush.
    pub async fn write<W: AsyncWrite + Unpin>(&self, w: &mut W) -> Result<()> {
        let method_bytes = self.service_method.as_bytes();
        let mut data = Vec::with_capacity(HEADER_SIZE + method_bytes.len());
        data.extend_from_slice(&(method_bytes.len() as u16).to_be_bytes());
        data.extend_from_slice(&self.compress_type.to_be_bytes());
        data.extend_from_slice(&self.body_len.to_be_bytes());
        data.extend_from_slice(&self.seq.to_be_bytes());
        data.extend_from_slice(method_bytes);
        w.write_all(&data).await.map_err(Error::Transport)?;
        w.flush().await.map_err(Error::Transport)
    }
}

/// A decoded response header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeader {
    pub compress_type: u16,
    pub body_len: u32,
    pub seq: u64,
    pub error: String,
}

impl ResponseHeader {
    /// Peek the leading `ErrorLen` field, then read and decode the full
    /// header (fixed portion + `Error`) from a buffered reader.
    pub async fn read<R: AsyncBufRead + Unpin>(r: &mut R) -> Result<Self> {
        let error_len = peek_u16(r).await?;
        let total = HEADER_SIZE + error_len as usize;
        let mut data = vec![0u8; total];
        read_exact_or_short(r, &mut data, "ResponseHeader").await?;

        let compress_type = u16::from_be_bytes([data[2], data[3]]);
        let body_len = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let seq = u64::from_be_bytes(data[8..16].try_into().unwrap());
        let error = String::from_utf8_lossy(&data[16..]).into_owned();

        Ok(ResponseHeader {
            compress_type,
            body_len,
            seq,
            error,
        })
    }

    /// Encode and write the header, then flush.
    pub async fn write<W: AsyncWrite + Unpin>(&self, w: &mut W) -> Result<()> {
        let error_bytes = self.error.as_bytes();
        let mut data = Vec::with_capacity(HEADER_SIZE + error_bytes.len());
        data.extend_from_slice(&(error_bytes.len() as u16).to_be_bytes());
        data.extend_from_slice(&self.compress_type.to_be_bytes());
        data.extend_from_slice(&self.body_len.to_be_bytes());
        data.extend_from_slice(&self.seq.to_be_bytes());
        data.extend_from_slice(error_bytes);
        w.write_all(&data).await.map_err(Error::Transport)?;
        w.flush().await.map_err(Error::Transport)
    }
}

/// Peek the first 2 bytes of the stream (the length prefix) without
/// consuming them, so the caller can size the full header read.
async fn peek_u16<R: AsyncBufRead + Unpin>(r: &mut R) -> Result<u16> {
    let buf = r.fill_buf().await.map_err(Error::Transport)?;
    if buf.len() < 2 {
        return Err(Error::short_read("header length prefix", 2, buf.len()));
    }
    Ok(u16::from_be_bytes([buf[0], buf[1]]))
}

async fn read_exact_or_short<R: AsyncBufRead + Unpin>(
    r: &mut R,
    data: &mut [u8],
    context: &str,
) -> Result<()> {
    use tokio::io::AsyncReadExt;
    match r.read_exact(data).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(Error::short_read(context, data.len(), 0))
        }
        Err(e) => Err(Error::Transport(e)),
    }
}

/// A thread-safe free list for header structs, avoiding a fresh allocation
/// for the fixed portion of every frame.
///
/// Not required for correctness (headers are cheap `Default`-able structs);
/// mirrors `sync.Pool` usage for the same structs elsewhere, since
/// high-throughput servers benefit from not re-allocating 16+ bytes per
/// request.
pub struct HeaderPool<T> {
    free: Mutex<Vec<T>>,
}

impl<T: Default> HeaderPool<T> {
    pub fn new() -> Self {
        HeaderPool {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Take a pooled value, or a fresh `Default` one if the pool is empty.
    pub fn get(&self) -> T {
        self.free.lock().unwrap().pop().unwrap_or_default()
    }

    /// Return a value to the pool for reuse.
    pub fn put(&self, value: T) {
        self.free.lock().unwrap().push(value);
    }
}

impl<T: Default> Default for HeaderPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide free lists, one per header kind.
pub static REQUEST_HEADER_POOL: std::sync::LazyLock<HeaderPool<RequestHeader>> =
    std::sync::LazyLock::new(HeaderPool::new);
pub static RESPONSE_HEADER_POOL: std::sync::LazyLock<HeaderPool<ResponseHeader>> =
    std::sync::LazyLock::new(HeaderPool::new);

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn request_header_round_trip() {
        let header = RequestHeader {
            compress_type: 1,
            body_len: 42,
            seq: 7,
            service_method: "Svc.Test".to_string(),
        };

        let mut buf = Vec::new();
        header.write(&mut buf).await.unwrap();

        let mut reader = BufReader::new(&buf[..]);
        let decoded = RequestHeader::read(&mut reader).await.unwrap();
        assert_eq!(decoded, header);
    }

    #[tokio::test]
    async fn response_header_round_trip() {
        let header = ResponseHeader {
            compress_type: 2,
            body_len: 0,
            seq: 99,
            error: "kaboom".to_string(),
        };

        let mut buf = Vec::new();
        header.write(&mut buf).await.unwrap();

        let mut reader = BufReader::new(&buf[..]);
        let decoded = ResponseHeader::read(&mut reader).await.unwrap();
        assert_eq!(decoded, header);
    }

    #[tokio::test]
    async fn short_read_is_framing_error() {
        let mut reader = BufReader::new(&[0u8, 5][..]); // claims 5-byte method, but nothing follows
        let err = RequestHeader::read(&mut reader).await.unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
    }

    #[tokio::test]
    async fn empty_stream_is_framing_error() {
        let mut reader = BufReader::new(&[][..]);
        let err = RequestHeader::read(&mut reader).await.unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
    }

    #[test]
    fn header_pool_reuses_values() {
        let pool: HeaderPool<RequestHeader> = HeaderPool::new();
        let mut h = pool.get();
        h.seq = 5;
        pool.put(h);

        let reused = pool.get();
        assert_eq!(reused.seq, 5);
    }
}
