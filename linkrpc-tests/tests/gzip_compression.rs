mod support;

use linkrpc_core::compress;
use linkrpc_server::service::ServiceBuilder;
use linkrpc_server::ServiceMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct BigArg {
    text: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct BigReply {
    len: usize,
}

fn echo_service() -> ServiceMap {
    let mut map = ServiceMap::new();
    map.register(ServiceBuilder::new("Svc").method("Echo", |a: BigArg| async move {
        Ok(BigReply { len: a.text.len() })
    }))
    .unwrap();
    map
}

/// A client call declaring `CompressType=Gzip` round-trips through the real
/// `Client`/`Server` pair, and the wire-level compressor actually shrinks a
/// repetitive 1 MiB payload.
#[tokio::test]
async fn gzip_call_round_trips_and_shrinks_repetitive_payload() {
    let addr = support::spawn_server(echo_service()).await;
    let client = support::connect(addr).await;

    let text = "a".repeat(1 << 20);
    let raw = serde_json::to_vec(&BigArg { text: text.clone() }).unwrap();
    let compressor = compress::lookup(compress::GZIP).unwrap();
    let zipped = compressor.zip(&raw).unwrap();
    assert!(
        zipped.len() * 2 < raw.len(),
        "expected at least 2x compression: raw={} zipped={}",
        raw.len(),
        zipped.len()
    );

    let reply: BigReply = client
        .call_with_compression("Svc.Echo", &BigArg { text: text.clone() }, compress::GZIP)
        .await
        .unwrap();
    assert_eq!(reply, BigReply { len: text.len() });
}
