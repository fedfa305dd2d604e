//! Accept loop and per-connection dispatcher.
//!
//! Adapted from `Server.Accept`/`Server.ServeCodec`: `accept` spawns one
//! task per connection, and each
//! connection's serve loop reads a preamble, then reads requests and spawns
//! one worker task per request so a slow method never blocks the rest of
//! the connection's pending calls.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use linkrpc_core::codec::ServerCodec;
use linkrpc_core::preamble::Options;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info_span, Instrument};

use crate::error::Result;
use crate::service::ServiceMap;

/// An RPC server: a service registry plus the accept loop that serves
/// connections against it.
pub struct Server {
    services: Arc<ServiceMap>,
}

impl Server {
    pub fn new(services: ServiceMap) -> Self {
        Server {
            services: Arc::new(services),
        }
    }

    /// Accept connections from `listener` until it returns an error, serving
    /// each on its own task. Mirrors `Server.Accept`: a fatal accept error
    /// ends the loop rather than retrying, since the listener itself is
    /// presumed unrecoverable at that point.
    pub async fn accept(&self, listener: TcpListener) -> io::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let services = self.services.clone();
            tokio::spawn(
                async move {
                    if let Err(e) = serve_connection(stream, services).await {
                        tracing::warn!(error = %e, "connection ended with error");
                    }
                }
                .instrument(info_span!("rpc.connection", %peer)),
            );
        }
    }
}

/// Serve a single already-accepted connection: read the newline-terminated
/// JSON preamble, then loop reading requests and spawning a worker per
/// request until the connection ends, draining any in-flight workers before
/// returning. [`Server::accept`] calls this once per accepted connection;
/// exposed directly for callers that manage their own listener or transport
/// (e.g. serving over something other than a `TcpListener`).
///
/// If a read failure follows a successfully parsed header (a body read or
/// decompression error), a best-effort error response is sent for that
/// `Seq` before the connection is torn down or the loop continues.
pub async fn serve_connection<S>(stream: S, services: Arc<ServiceMap>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (options, remainder) = read_preamble(stream).await?;
    let handle_timeout = options.handle_timeout;
    let codec = Arc::new(ServerCodec::new(remainder));

    let mut workers: FuturesUnordered<JoinHandle<()>> = FuturesUnordered::new();

    loop {
        tokio::select! {
            biased;

            request = codec.read_request() => {
                match request {
                    Ok((header, body)) => {
                        let services = services.clone();
                        let codec = codec.clone();
                        workers.push(tokio::spawn(
                            serve_request(services, codec, header.seq, header.service_method, body, handle_timeout)
                                .instrument(info_span!("rpc.call", seq = header.seq)),
                        ));
                    }
                    Err(e) => {
                        if let Some(header) = &e.header {
                            let message = e.source.to_string();
                            if let Err(write_err) = codec.write_response(header.seq, message, &[]).await {
                                tracing::warn!(error = %write_err, seq = header.seq, "failed sending best-effort error response");
                            }
                        }
                        // drain in-flight workers before surfacing the read error
                        while workers.next().await.is_some() {}
                        return if e.source.is_connection_fatal() { Err(e.source.into()) } else { Ok(()) };
                    }
                }
            }

            Some(_) = workers.next(), if !workers.is_empty() => {}
        }
    }
}

/// Decode a single request body against the caller-supplied type, invoke
/// the registered handler, and write the response, applying `handle_timeout`
/// as an advisory deadline, matching `HandleTimeout`: on expiry, an
/// error response is sent but the worker itself is not forcibly killed,
/// since the underlying handler future may hold resources that need to run
/// to completion.
async fn serve_request<S>(
    services: Arc<ServiceMap>,
    codec: Arc<ServerCodec<S>>,
    seq: u64,
    service_method: String,
    body: Bytes,
    handle_timeout: Option<std::time::Duration>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let call = services.dispatch(&service_method, body);

    let (reply, error) = match handle_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, call).await {
            Ok(Ok(reply)) => (reply, String::new()),
            Ok(Err(msg)) => (Vec::new(), msg),
            Err(_) => (Vec::new(), format!("rpc: handler timed out after {timeout:?}")),
        },
        None => match call.await {
            Ok(reply) => (reply, String::new()),
            Err(msg) => (Vec::new(), msg),
        },
    };

    if let Err(e) = codec.write_response(seq, error, &reply).await {
        tracing::warn!(error = %e, seq, "failed writing response");
    }
}

/// Read a single newline-terminated JSON line (the `Options` preamble) off
/// the front of `stream`, returning the parsed options and the stream with
/// that line consumed so frame reads can resume immediately after it.
async fn read_preamble<S>(stream: S) -> Result<(Options, PrefixedStream<S>)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    reader
        .read_until(b'\n', &mut line)
        .await
        .map_err(linkrpc_core::Error::Transport)?;
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    let options = Options::from_line(&line)?;
    // `BufReader` may have buffered bytes past the preamble's newline; since
    // `ServerCodec` wraps the stream in its own `BufReader`, hand back the
    // inner stream with exactly the preamble consumed by re-wrapping with
    // whatever `into_inner` gives us plus any already-buffered remainder.
    let buffered = reader.buffer().to_vec();
    let inner = reader.into_inner();
    Ok((options, PrefixedStream::new(buffered, inner)))
}

/// Glues back together the bytes a `BufReader` had already buffered past the
/// preamble's newline with the underlying stream, so no bytes are lost when
/// handing the connection off to `ServerCodec`.
struct PrefixedStream<S> {
    prefix: Bytes,
    inner: S,
}

impl<S> PrefixedStream<S> {
    fn new(prefix: Vec<u8>, inner: S) -> Self {
        PrefixedStream {
            prefix: Bytes::from(prefix),
            inner,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PrefixedStream<S> {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.prefix.is_empty() {
            let n = std::cmp::min(buf.remaining(), this.prefix.len());
            buf.put_slice(&this.prefix[..n]);
            this.prefix = this.prefix.split_off(n);
            return std::task::Poll::Ready(Ok(()));
        }
        std::pin::Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PrefixedStream<S> {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        std::pin::Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Convenience entry point: bind a `TcpListener` and accept forever.
pub async fn serve(addr: impl tokio::net::ToSocketAddrs, services: ServiceMap) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(linkrpc_core::Error::Transport)?;
    let server = Server::new(services);
    server
        .accept(listener)
        .await
        .map_err(linkrpc_core::Error::Transport)?;
    Ok(())
}
