//! HTTP service registry.
//!
//! Adapted from `TinyRegistry`: an in-memory `service name ->
//! [ServerItem]` map behind a mutex, served over
//! two plain HTTP endpoints. `gin.Context` query params become axum
//! [`Query`] extractors; `crc32.ChecksumIEEE` becomes [`flate2::Crc`], which
//! is already in the dependency stack for gzip body compression elsewhere
//! in this workspace.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

/// One registered server instance for a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerItem {
    pub addr: String,
    pub hash: u32,
    /// Unix timestamp (seconds) of the last registration/refresh.
    #[serde(rename = "updateTime")]
    pub update_time: u64,
}

fn crc32(addr: &str) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(addr.as_bytes());
    crc.sum()
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Default)]
struct Inner {
    servers: HashMap<String, Vec<ServerItem>>,
}

/// In-memory registry: service name -> known server addresses. Register the
/// same `(service, addr)` again to refresh its `update_time` in place
/// rather than accumulating duplicate entries, matched by address hash.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<Inner>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(&self, service_name: &str, addr: &str) {
        let item = ServerItem {
            addr: addr.to_string(),
            hash: crc32(addr),
            update_time: now(),
        };

        let mut inner = self.inner.lock().unwrap();
        let entries = inner.servers.entry(service_name.to_string()).or_default();
        match entries.iter_mut().find(|s| s.hash == item.hash) {
            Some(existing) => *existing = item,
            None => entries.push(item),
        }
        tracing::info!(service_name, addr, "registered server");
    }

    pub fn lookup(&self, service_name: &str) -> Vec<ServerItem> {
        self.inner
            .lock()
            .unwrap()
            .servers
            .get(service_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Build the axum router serving `GET /register` and `GET /lookup`.
    pub fn router(self) -> Router {
        Router::new()
            .route("/register", get(register_handler))
            .route("/lookup", get(lookup_handler))
            .with_state(self)
    }
}

#[derive(Debug, Deserialize)]
struct RegisterParams {
    #[serde(rename = "serviceName")]
    service_name: String,
    addr: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    msg: &'static str,
}

async fn register_handler(
    State(registry): State<Registry>,
    Query(params): Query<RegisterParams>,
) -> Json<RegisterResponse> {
    registry.register(&params.service_name, &params.addr);
    Json(RegisterResponse { msg: "ok" })
}

#[derive(Debug, Deserialize)]
struct LookupParams {
    #[serde(rename = "serviceName")]
    service_name: String,
}

#[derive(Debug, Serialize)]
struct LookupResponse {
    msg: &'static str,
    data: Vec<ServerItem>,
}

async fn lookup_handler(
    State(registry): State<Registry>,
    Query(params): Query<LookupParams>,
) -> Json<LookupResponse> {
    let data = registry.lookup(&params.service_name);
    Json(LookupResponse { msg: "ok", data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup_returns_the_server() {
        let registry = Registry::new();
        registry.register("Arith", "127.0.0.1:9000");
        let servers = registry.lookup("Arith");
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].addr, "127.0.0.1:9000");
    }

    #[test]
    fn re_registering_same_addr_updates_in_place() {
        let registry = Registry::new();
        registry.register("Arith", "127.0.0.1:9000");
        registry.register("Arith", "127.0.0.1:9000");
        assert_eq!(registry.lookup("Arith").len(), 1);
    }

    #[test]
    fn distinct_addrs_accumulate() {
        let registry = Registry::new();
        registry.register("Arith", "127.0.0.1:9000");
        registry.register("Arith", "127.0.0.1:9001");
        assert_eq!(registry.lookup("Arith").len(), 2);
    }

    #[test]
    fn lookup_unknown_service_is_empty() {
        let registry = Registry::new();
        assert!(registry.lookup("Nope").is_empty());
    }

    #[test]
    fn server_item_serializes_with_camel_case_update_time() {
        let item = ServerItem {
            addr: "127.0.0.1:9000".to_string(),
            hash: 1,
            update_time: 42,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["updateTime"], serde_json::json!(42));
        assert!(json.get("update_time").is_none());
    }
}
