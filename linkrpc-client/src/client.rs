//! Multiplexing client.
//!
//! One connection, one background task (`input_loop`) demultiplexing
//! responses back to whichever caller is waiting on a given sequence
//! number, the same shape as `Client.input`, translated from a goroutine
//! over a shared map with a mutex into a Tokio task over a `HashMap`
//! guarded by a `std::sync::Mutex` never held across an `.await`.
//! [`Client::call`] blocks the caller until its response arrives;
//! [`Client::go`] returns immediately and resolves once the background
//! loop delivers the result, mirroring the `Call`/`Go` split.
//!
//! Sequence assignment and the corresponding write are done under a single
//! async lock ([`Client::send`]) so concurrent callers can never interleave
//! a lower seq's write after a higher seq's: sends are strictly FIFO even
//! though completions (driven by whatever order the server replies in) are
//! not.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use linkrpc_core::codec::ClientCodec;
use linkrpc_core::compress;
use linkrpc_core::preamble::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use crate::error::{Error, Result};

type PendingTable = StdMutex<HashMap<u64, oneshot::Sender<Result<Bytes>>>>;

/// A connected client. Cheap to clone (an `Arc` internally); share the
/// `Arc<Client<S>>` returned by [`Client::connect`] across tasks making
/// concurrent calls on the same connection.
pub struct Client<S> {
    codec: Arc<ClientCodec<S>>,
    next_seq: AsyncMutex<u64>,
    pending: PendingTable,
    closed: AtomicBool,
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Write the options preamble, then spawn the background input loop
    /// and return the client ready for calls.
    pub async fn connect(mut stream: S, options: Options) -> Result<Arc<Self>> {
        stream
            .write_all(&options.to_line()?)
            .await
            .map_err(linkrpc_core::Error::Transport)?;

        let client = Arc::new(Client {
            codec: Arc::new(ClientCodec::new(stream)),
            next_seq: AsyncMutex::new(1),
            pending: StdMutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(input_loop(client.clone()));
        Ok(client)
    }

    /// Make a call and wait for the reply, sending the body uncompressed.
    pub async fn call<Req, Resp>(&self, service_method: &str, args: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        self.call_with_compression(service_method, args, compress::RAW)
            .await
    }

    /// Make a call and wait for the reply, compressing the request body with
    /// `compress_type` (e.g. [`compress::GZIP`]). Compressor choice is
    /// per-frame: the server replies using whatever `compress_type` this
    /// call declared.
    pub async fn call_with_compression<Req, Resp>(
        &self,
        service_method: &str,
        args: &Req,
        compress_type: u16,
    ) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let rx = self.send(service_method, args, compress_type).await?;
        let body = rx.await.map_err(|_| {
            Error::Shutdown(format!(
                "connection closed before {service_method} returned"
            ))
        })??;
        serde_json::from_slice(&body)
            .map_err(|e| Error::Core(linkrpc_core::Error::Serialize(e.to_string())))
    }

    /// Make a call without waiting; the returned [`PendingCall`] resolves
    /// once the background input loop demultiplexes the matching response.
    pub fn go<Req, Resp>(self: &Arc<Self>, service_method: String, args: Req) -> PendingCall<Resp>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        self.go_with_compression(service_method, args, compress::RAW)
    }

    /// Like [`Client::go`], but compresses the request body with
    /// `compress_type`.
    pub fn go_with_compression<Req, Resp>(
        self: &Arc<Self>,
        service_method: String,
        args: Req,
        compress_type: u16,
    ) -> PendingCall<Resp>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let client = self.clone();
        tokio::spawn(async move {
            let result = client
                .call_with_compression::<Req, Resp>(&service_method, &args, compress_type)
                .await;
            let _ = done_tx.send(result);
        });
        PendingCall { done: done_rx }
    }

    /// Mark the client shut down and fail every outstanding call. Called by
    /// the input loop on exit.
    fn shutdown(&self, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
        let mut pending = self.pending.lock().unwrap();
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(Error::Shutdown(reason.to_string())));
        }
    }

    /// Assign the next sequence number and write the request, all under
    /// one lock, so writes hit the wire in the same order seqs are handed
    /// out.
    async fn send<Req: Serialize>(
        &self,
        service_method: &str,
        args: &Req,
        compress_type: u16,
    ) -> Result<oneshot::Receiver<Result<Bytes>>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Shutdown("client already closed".to_string()));
        }

        let body = serde_json::to_vec(args)
            .map_err(|e| Error::Core(linkrpc_core::Error::Serialize(e.to_string())))?;

        let mut next_seq = self.next_seq.lock().await;
        let seq = *next_seq;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(seq, tx);

        if let Err(e) = self
            .codec
            .write_request(seq, service_method.to_string(), compress_type, &body)
            .await
        {
            self.pending.lock().unwrap().remove(&seq);
            return Err(e.into());
        }

        *next_seq += 1;
        Ok(rx)
    }
}

/// A call started with [`Client::go`]. Await [`PendingCall::wait`] to get
/// the reply once the background input loop delivers it.
pub struct PendingCall<Resp> {
    done: oneshot::Receiver<Result<Resp>>,
}

impl<Resp> PendingCall<Resp> {
    pub async fn wait(self) -> Result<Resp> {
        self.done
            .await
            .map_err(|_| Error::Shutdown("client dropped before call completed".to_string()))?
    }
}

/// Reads responses off the connection and demultiplexes each one to its
/// waiting caller by sequence number. Runs until the connection errors, at
/// which point every outstanding call is failed with [`Error::Shutdown`].
/// Completion is exactly-once per call, since a `seq` is removed from
/// `pending` the moment its response (or the shutdown sweep) resolves it.
async fn input_loop<S>(client: Arc<Client<S>>)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    loop {
        match client.codec.read_response().await {
            Ok((header, body)) => {
                let waiter = client.pending.lock().unwrap().remove(&header.seq);
                let Some(waiter) = waiter else {
                    tracing::warn!(seq = header.seq, "response for unknown seq, dropping");
                    continue;
                };
                let result = if header.error.is_empty() {
                    Ok(body)
                } else {
                    Err(Error::Remote(header.error))
                };
                let _ = waiter.send(result);
            }
            Err(e) => {
                client.shutdown(&e.to_string());
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkrpc_server::service::ServiceBuilder;
    use linkrpc_server::ServiceMap;
    use serde::Deserialize;
    use tokio::io::duplex;

    #[derive(Debug, Serialize, Deserialize)]
    struct Args {
        a: i32,
        b: i32,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Reply {
        sum: i32,
    }

    fn arith() -> ServiceMap {
        let mut map = ServiceMap::new();
        map.register(
            ServiceBuilder::new("Arith")
                .method("Add", |a: Args| async move { Ok(Reply { sum: a.a + a.b }) }),
        )
        .unwrap();
        map
    }

    #[tokio::test]
    async fn call_round_trips_through_real_server_dispatcher() {
        let (client_stream, server_stream) = duplex(8192);
        let services = Arc::new(arith());
        tokio::spawn(linkrpc_server::serve_connection(server_stream, services));

        let client = Client::connect(client_stream, Options::default()).await.unwrap();
        let reply: Reply = client.call("Arith.Add", &Args { a: 10, b: 32 }).await.unwrap();
        assert_eq!(reply, Reply { sum: 42 });
    }

    #[tokio::test]
    async fn go_resolves_once_response_arrives() {
        let (client_stream, server_stream) = duplex(8192);
        let services = Arc::new(arith());
        tokio::spawn(linkrpc_server::serve_connection(server_stream, services));

        let client = Client::connect(client_stream, Options::default()).await.unwrap();
        let pending: PendingCall<Reply> = client.go("Arith.Add".to_string(), Args { a: 1, b: 2 });
        let reply = pending.wait().await.unwrap();
        assert_eq!(reply, Reply { sum: 3 });
    }

    #[tokio::test]
    async fn concurrent_calls_all_complete() {
        let (client_stream, server_stream) = duplex(1 << 16);
        let services = Arc::new(arith());
        tokio::spawn(linkrpc_server::serve_connection(server_stream, services));

        let client = Client::connect(client_stream, Options::default()).await.unwrap();
        let mut pending = Vec::new();
        for i in 0..200 {
            pending.push(client.go::<_, Reply>("Arith.Add".to_string(), Args { a: i, b: 1 }));
        }
        for (i, call) in pending.into_iter().enumerate() {
            let reply = call.wait().await.unwrap();
            assert_eq!(reply, Reply { sum: i as i32 + 1 });
        }
    }

    #[tokio::test]
    async fn unknown_method_surfaces_as_remote_error() {
        let (client_stream, server_stream) = duplex(8192);
        let services = Arc::new(arith());
        tokio::spawn(linkrpc_server::serve_connection(server_stream, services));

        let client = Client::connect(client_stream, Options::default()).await.unwrap();
        let err = client
            .call::<_, Reply>("Arith.Missing", &Args { a: 1, b: 2 })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
    }

    #[tokio::test]
    async fn call_with_compression_round_trips_gzip() {
        let (client_stream, server_stream) = duplex(1 << 20);
        let services = Arc::new(arith());
        tokio::spawn(linkrpc_server::serve_connection(server_stream, services));

        let client = Client::connect(client_stream, Options::default()).await.unwrap();
        let reply: Reply = client
            .call_with_compression("Arith.Add", &Args { a: 10, b: 32 }, compress::GZIP)
            .await
            .unwrap();
        assert_eq!(reply, Reply { sum: 42 });
    }

    #[tokio::test]
    async fn pending_calls_fail_with_shutdown_when_connection_closes() {
        let (client_stream, server_stream) = duplex(8192);
        drop(server_stream); // close immediately so the input loop sees an error

        let client = Client::connect(client_stream, Options::default()).await.unwrap();
        let err = client
            .call::<_, Reply>("Arith.Add", &Args { a: 1, b: 1 })
            .await
            .unwrap_err();
        assert!(err.is_connection_fatal());
    }
}
