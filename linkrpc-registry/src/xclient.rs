//! Discovery-backed client that dials a fresh connection per call.
//!
//! Mirrors `XClient.Call`: no connection pool, no persistent
//! [`linkrpc_client::Client`] kept around between calls. Every call asks its
//! [`Discovery`] for an address, dials a new `TcpStream`, performs exactly
//! one call, and lets the connection (and its background input loop) drop
//! once the reply arrives. Simple and correct at the cost of a fresh
//! handshake per call; callers who need connection reuse should hold a
//! [`linkrpc_client::Client`] directly instead of going through `XClient`.

use std::sync::Arc;

use linkrpc_core::preamble::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;

use crate::discovery::Discovery;
use crate::error::{Error, Result};

pub struct XClient {
    discovery: Arc<dyn Discovery>,
    options: Options,
}

impl XClient {
    pub fn new(discovery: Arc<dyn Discovery>) -> Self {
        XClient {
            discovery,
            options: Options::default(),
        }
    }

    pub fn with_options(discovery: Arc<dyn Discovery>, options: Options) -> Self {
        XClient { discovery, options }
    }

    /// Resolve an address via discovery, dial it, and make one call.
    pub async fn call<Req, Resp>(&self, service_method: &str, args: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let addr = self.discovery.get().await?;
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| Error::Connect {
                addr: addr.clone(),
                source,
            })?;
        let client = linkrpc_client::Client::connect(stream, self.options.clone()).await?;
        Ok(client.call(service_method, args).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Discovery;
    use async_trait::async_trait;
    use linkrpc_server::service::ServiceBuilder;
    use linkrpc_server::ServiceMap;
    use serde::Deserialize;
    use tokio::net::TcpListener;

    #[derive(Debug, Serialize, Deserialize)]
    struct Args {
        a: i32,
        b: i32,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Reply {
        sum: i32,
    }

    struct FixedDiscovery(String);

    #[async_trait]
    impl Discovery for FixedDiscovery {
        async fn refresh(&self) -> Result<()> {
            Ok(())
        }

        async fn get(&self) -> Result<String> {
            Ok(self.0.clone())
        }
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
    async fn call_dials_the_discovered_address_and_returns_the_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let services = Arc::new(arith());

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(linkrpc_server::serve_connection(stream, services.clone()));
            }
        });

        let discovery: Arc<dyn Discovery> = Arc::new(FixedDiscovery(addr.to_string()));
        let xclient = XClient::new(discovery);
        let reply: Reply = xclient.call("Arith.Add", &Args { a: 4, b: 5 }).await.unwrap();
        assert_eq!(reply, Reply { sum: 9 });
    }

    #[tokio::test]
    async fn call_fails_when_discovery_returns_an_unreachable_address() {
        let discovery: Arc<dyn Discovery> = Arc::new(FixedDiscovery("127.0.0.1:1".to_string()));
        let xclient = XClient::new(discovery);
        let err = xclient
            .call::<_, Reply>("Arith.Add", &Args { a: 1, b: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
    }
}
