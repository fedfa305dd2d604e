//! Service discovery against the HTTP registry.
//!
//! Mirrors `Discovery`/`TinyDiscovery`: fetch the current server list for
//! a service from the registry over HTTP, cache it, and pick one entry per
//! call according to a selection mode. `GetOne(mode 0)` (random) and the
//! default (round robin) become two separate types here rather than one
//! type with a mode flag, since Rust's trait objects make picking a
//! strategy at construction time cheap and an enum-with-mode shape has no
//! real advantage.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::Rng;

use crate::error::{Error, Result};
use crate::registry::ServerItem;

/// Resolves a service name to one address to dial for the next call.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Refresh the cached server list from the registry.
    async fn refresh(&self) -> Result<()>;

    /// Pick one address for the next call, refreshing first if the cache
    /// is empty.
    async fn get(&self) -> Result<String>;
}

struct Cache {
    servers: Vec<ServerItem>,
    next: usize,
}

/// Polls `GET {registry_addr}/lookup?serviceName=...` and round-robins
/// across the returned addresses.
pub struct RoundRobinDiscovery {
    registry_addr: String,
    service_name: String,
    http: reqwest::Client,
    cache: Mutex<Cache>,
}

impl RoundRobinDiscovery {
    pub fn new(registry_addr: impl Into<String>, service_name: impl Into<String>) -> Self {
        RoundRobinDiscovery {
            registry_addr: registry_addr.into(),
            service_name: service_name.into(),
            http: reqwest::Client::new(),
            cache: Mutex::new(Cache {
                servers: Vec::new(),
                next: 0,
            }),
        }
    }

    async fn lookup(&self) -> Result<Vec<ServerItem>> {
        let url = format!(
            "{}/lookup?serviceName={}",
            self.registry_addr.trim_end_matches('/'),
            self.service_name
        );
        let resp: LookupResponse = self.http.get(url).send().await?.json().await?;
        Ok(resp.data)
    }
}

#[derive(serde::Deserialize)]
struct LookupResponse {
    data: Vec<ServerItem>,
}

#[async_trait]
impl Discovery for RoundRobinDiscovery {
    async fn refresh(&self) -> Result<()> {
        let servers = self.lookup().await?;
        let mut cache = self.cache.lock().unwrap();
        cache.servers = servers;
        cache.next = 0;
        Ok(())
    }

    async fn get(&self) -> Result<String> {
        if self.cache.lock().unwrap().servers.is_empty() {
            self.refresh().await?;
        }

        let mut cache = self.cache.lock().unwrap();
        if cache.servers.is_empty() {
            return Err(Error::NoServers(self.service_name.clone()));
        }
        let idx = cache.next % cache.servers.len();
        cache.next = cache.next.wrapping_add(1);
        Ok(cache.servers[idx].addr.clone())
    }
}

/// Like [`RoundRobinDiscovery`] but always returns the first registered
/// address, refreshing from the registry only when the cache is empty.
/// Mirrors `TinyDiscovery.GetOne` under mode `RandomSelect` collapsed to a
/// single pick since a single caller has no concurrent pool to randomize
/// over; use [`RoundRobinDiscovery`] when load should spread across
/// multiple callers.
pub struct FirstResultDiscovery {
    registry_addr: String,
    service_name: String,
    http: reqwest::Client,
    cache: Mutex<Vec<ServerItem>>,
}

impl FirstResultDiscovery {
    pub fn new(registry_addr: impl Into<String>, service_name: impl Into<String>) -> Self {
        FirstResultDiscovery {
            registry_addr: registry_addr.into(),
            service_name: service_name.into(),
            http: reqwest::Client::new(),
            cache: Mutex::new(Vec::new()),
        }
    }

    async fn lookup(&self) -> Result<Vec<ServerItem>> {
        let url = format!(
            "{}/lookup?serviceName={}",
            self.registry_addr.trim_end_matches('/'),
            self.service_name
        );
        let resp: LookupResponse = self.http.get(url).send().await?.json().await?;
        Ok(resp.data)
    }
}

#[async_trait]
impl Discovery for FirstResultDiscovery {
    async fn refresh(&self) -> Result<()> {
        let servers = self.lookup().await?;
        *self.cache.lock().unwrap() = servers;
        Ok(())
    }

    async fn get(&self) -> Result<String> {
        {
            let cache = self.cache.lock().unwrap();
            if let Some(first) = cache.first() {
                return Ok(first.addr.clone());
            }
        }
        self.refresh().await?;
        let cache = self.cache.lock().unwrap();
        cache
            .first()
            .map(|s| s.addr.clone())
            .ok_or_else(|| Error::NoServers(self.service_name.clone()))
    }
}

/// Picks a uniformly random server from a pre-fetched list. Exposed as a
/// free function rather than a third [`Discovery`] impl since, unlike the
/// other two, it needs no persistent cache across calls.
pub fn pick_random(servers: &[ServerItem]) -> Option<&ServerItem> {
    if servers.is_empty() {
        return None;
    }
    let idx = rand::thread_rng().gen_range(0..servers.len());
    servers.get(idx)
}
