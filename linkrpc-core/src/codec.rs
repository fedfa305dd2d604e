//! Client- and server-side codecs: framing plus compression composed over
//! an async byte stream.
//!
//! Adapted from `codec.ServerCodec`/`codec.ClientCodec`. Both codecs work
//! in terms of raw, already-serialized body bytes; the caller (dispatcher
//! or multiplexer) owns the concrete `Serialize`/`DeserializeOwned` types
//! and calls into [`crate::serialize`] itself, since a single connection
//! carries many distinct request/reply types.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use bytes::Bytes;
use tokio::io::{split, AsyncRead, AsyncWrite, BufReader, BufWriter, ReadHalf, WriteHalf};
use tokio::sync::Mutex as AsyncMutex;

use crate::compress;
use crate::error::{Error, Result};
use crate::frame::{RequestHeader, ResponseHeader};

/// Error from [`ServerCodec::read_request`]. Retains the request header when
/// one was already parsed before the failure (a body read or decompression
/// error), so the caller can still attribute a best-effort error response to
/// the right `Seq`.
#[derive(Debug)]
pub struct ReadRequestError {
    pub header: Option<RequestHeader>,
    pub source: Error,
}

impl From<Error> for ReadRequestError {
    fn from(source: Error) -> Self {
        ReadRequestError {
            header: None,
            source,
        }
    }
}

impl std::fmt::Display for ReadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.source, f)
    }
}

impl std::error::Error for ReadRequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Server-side codec: reads framed requests and writes framed responses
/// over a single connection.
///
/// The reader is only ever driven by the connection's serve loop (one
/// request at a time), so contention on `reader` is never expected; it is
/// still behind a lock so `ServerCodec` can be shared as `Arc<ServerCodec<_>>`
/// between the serve loop and the worker tasks it spawns, which only ever
/// touch `writer`.
pub struct ServerCodec<S> {
    reader: AsyncMutex<BufReader<ReadHalf<S>>>,
    writer: AsyncMutex<BufWriter<WriteHalf<S>>>,
    /// seq -> compress_type the request declared, so the response is
    /// compressed the same way. Populated by `read_request`, drained by
    /// `write_response`.
    pending: StdMutex<HashMap<u64, u16>>,
}

impl<S: AsyncRead + AsyncWrite> ServerCodec<S> {
    pub fn new(stream: S) -> Self {
        let (r, w) = split(stream);
        ServerCodec {
            reader: AsyncMutex::new(BufReader::new(r)),
            writer: AsyncMutex::new(BufWriter::new(w)),
            pending: StdMutex::new(HashMap::new()),
        }
    }

    /// Read the next request's header and decompressed body bytes.
    ///
    /// Returns [`Error::Framing`]/[`Error::Transport`] when the connection
    /// ends mid-frame (the expected way a connection close surfaces here);
    /// any other error leaves the stream desynchronized and the connection
    /// should be torn down.
    ///
    /// On failure, the returned [`ReadRequestError`] carries the header if
    /// one was already parsed, so the caller can send a best-effort error
    /// response for that `Seq` before tearing the connection down.
    pub async fn read_request(
        &self,
    ) -> std::result::Result<(RequestHeader, Bytes), ReadRequestError> {
        let mut reader = self.reader.lock().await;
        let header = RequestHeader::read(&mut *reader).await?;

        // Register the seq's compress_type as soon as the header is known,
        // so a best-effort error response can still be compressed correctly
        // if the body read or decompression fails below.
        self.pending
            .lock()
            .unwrap()
            .insert(header.seq, header.compress_type);

        let mut raw = vec![0u8; header.body_len as usize];
        use tokio::io::AsyncReadExt;
        if let Err(e) = reader.read_exact(&mut raw).await {
            return Err(ReadRequestError {
                header: Some(header),
                source: Error::Transport(e),
            });
        }
        drop(reader);

        let compressor = match compress::lookup(header.compress_type) {
            Ok(c) => c,
            Err(e) => {
                return Err(ReadRequestError {
                    header: Some(header),
                    source: e,
                })
            }
        };
        let body = match compressor.unzip(&raw) {
            Ok(b) => b,
            Err(e) => {
                return Err(ReadRequestError {
                    header: Some(header),
                    source: e,
                })
            }
        };
        Ok((header, body))
    }

    /// Write a response. `body` is the already-marshaled (but not yet
    /// compressed) reply bytes; pass an empty slice for error responses.
    pub async fn write_response(&self, seq: u64, error: String, body: &[u8]) -> Result<()> {
        let compress_type = self
            .pending
            .lock()
            .unwrap()
            .remove(&seq)
            .ok_or_else(|| Error::Protocol(format!("write_response: unknown seq {seq}")))?;

        let compressor = compress::lookup(compress_type)?;
        let zipped = compressor.zip(body)?;

        let mut header = crate::frame::RESPONSE_HEADER_POOL.get();
        header.compress_type = compress_type;
        header.body_len = zipped.len() as u32;
        header.seq = seq;
        header.error = error;

        let mut writer = self.writer.lock().await;
        let result = header.write(&mut *writer).await;
        header.error.clear();
        crate::frame::RESPONSE_HEADER_POOL.put(header);
        result?;

        use tokio::io::AsyncWriteExt;
        writer.write_all(&zipped).await.map_err(Error::Transport)?;
        writer.flush().await.map_err(Error::Transport)
    }
}

/// Client-side codec: writes framed requests and reads framed responses.
///
/// Unlike [`ServerCodec`], both halves are driven by a single owner (the
/// connection's background input loop reads; `Client::send` callers write),
/// so each half gets its own lock rather than sharing one.
pub struct ClientCodec<S> {
    reader: AsyncMutex<BufReader<ReadHalf<S>>>,
    writer: AsyncMutex<BufWriter<WriteHalf<S>>>,
}

impl<S: AsyncRead + AsyncWrite> ClientCodec<S> {
    pub fn new(stream: S) -> Self {
        let (r, w) = split(stream);
        ClientCodec {
            reader: AsyncMutex::new(BufReader::new(r)),
            writer: AsyncMutex::new(BufWriter::new(w)),
        }
    }

    /// Marshal-ready `body` is compressed here with `compress_type` and
    /// written as a single framed request.
    pub async fn write_request(
        &self,
        seq: u64,
        service_method: String,
        compress_type: u16,
        body: &[u8],
    ) -> Result<()> {
        let compressor = compress::lookup(compress_type)?;
        let zipped = compressor.zip(body)?;

        let mut header = crate::frame::REQUEST_HEADER_POOL.get();
        header.compress_type = compress_type;
        header.body_len = zipped.len() as u32;
        header.seq = seq;
        header.service_method = service_method;

        let mut writer = self.writer.lock().await;
        let result = header.write(&mut *writer).await;
        header.service_method.clear();
        crate::frame::REQUEST_HEADER_POOL.put(header);
        result?;

        use tokio::io::AsyncWriteExt;
        writer.write_all(&zipped).await.map_err(Error::Transport)?;
        writer.flush().await.map_err(Error::Transport)
    }

    /// Read the next response's header and decompressed body bytes.
    pub async fn read_response(&self) -> Result<(ResponseHeader, Bytes)> {
        let mut reader = self.reader.lock().await;
        let header = ResponseHeader::read(&mut *reader).await?;

        let mut raw = vec![0u8; header.body_len as usize];
        use tokio::io::AsyncReadExt;
        reader
            .read_exact(&mut raw)
            .await
            .map_err(Error::Transport)?;
        drop(reader);

        let compressor = compress::lookup(header.compress_type)?;
        let body = compressor.unzip(&raw)?;
        Ok((header, body))
    }
}
