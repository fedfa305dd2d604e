use std::sync::Arc;

use linkrpc_server::service::ServiceBuilder;
use linkrpc_server::ServiceMap;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

#[derive(Debug, Serialize, Deserialize)]
pub struct Arg {
    #[serde(rename = "X")]
    pub x: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    #[serde(rename = "X")]
    pub x: i64,
}

/// A `Svc` with `Test` (squares `X`) and `Boom` (always errors).
pub fn svc() -> ServiceMap {
    let mut map = ServiceMap::new();
    map.register(
        ServiceBuilder::new("Svc")
            .method("Test", |a: Arg| async move { Ok(Reply { x: a.x * a.x }) })
            .method("Boom", |_: Arg| async move {
                Err::<Reply, _>("kaboom".to_string())
            }),
    )
    .unwrap();
    map
}

/// Bind a `TcpListener` on an ephemeral port and spawn the accept loop
/// serving `services`. Returns the address to dial.
pub async fn spawn_server(services: ServiceMap) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = linkrpc_server::Server::new(services);
    tokio::spawn(async move {
        let _ = server.accept(listener).await;
    });
    addr
}

pub async fn connect(
    addr: std::net::SocketAddr,
) -> Arc<linkrpc_client::Client<tokio::net::TcpStream>> {
    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    linkrpc_client::Client::connect(stream, linkrpc_core::preamble::Options::default())
        .await
        .unwrap()
}
