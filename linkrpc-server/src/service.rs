//! Service registry.
//!
//! `net/rpc`-style dispatch relies on reflection to turn a struct's
//! exported methods into callable RPC methods. Rust has no runtime
//! reflection, so registration here is explicit: a [`ServiceBuilder`] collects
//! `(method name, handler closure)` pairs, and each handler owns its own
//! request/reply types behind `Serialize`/`DeserializeOwned` bounds instead
//! of `net/rpc`'s "exported identifier, 3-arg, pointer reply" checks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// A registered method: takes the raw (decompressed) request body and
/// returns the raw reply body, or an error message to send back on the
/// wire's `Error` field.
pub type MethodHandler =
    Arc<dyn Fn(Bytes) -> BoxFuture<'static, std::result::Result<Vec<u8>, String>> + Send + Sync>;

/// Builds a single service's method table before handing it to
/// [`ServiceMap::register`].
pub struct ServiceBuilder {
    name: String,
    methods: HashMap<String, MethodHandler>,
}

impl ServiceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ServiceBuilder {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Register a method. `f` receives the decoded request and returns the
    /// reply, or `Err(message)` to send back as the response's `Error`
    /// field, mirroring a method returning a non-nil `error` under
    /// `net/rpc`.
    pub fn method<Req, Resp, F, Fut>(mut self, name: &str, f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Resp, String>> + Send + 'static,
    {
        let f = Arc::new(f);
        let handler: MethodHandler = Arc::new(move |raw: Bytes| {
            let f = f.clone();
            Box::pin(async move {
                let req: Req = serde_json::from_slice(&raw)
                    .map_err(|e| format!("reading request body: {e}"))?;
                let resp = f(req).await?;
                serde_json::to_vec(&resp).map_err(|e| format!("writing reply body: {e}"))
            })
        });
        self.methods.insert(name.to_string(), handler);
        self
    }

    fn build(self) -> (String, HashMap<String, MethodHandler>) {
        (self.name, self.methods)
    }
}

/// Holds every registered service, keyed by service name, each mapping its
/// own method names to handlers.
#[derive(Default)]
pub struct ServiceMap {
    services: HashMap<String, HashMap<String, MethodHandler>>,
}

impl ServiceMap {
    pub fn new() -> Self {
        ServiceMap {
            services: HashMap::new(),
        }
    }

    /// Register a service under the name it was built with.
    pub fn register(&mut self, builder: ServiceBuilder) -> Result<()> {
        let (name, methods) = builder.build();
        self.insert(name, methods)
    }

    /// Register a service under an explicit name, ignoring the name it was
    /// built with. Equivalent to `Server.RegisterName`.
    pub fn register_name(&mut self, name: impl Into<String>, builder: ServiceBuilder) -> Result<()> {
        let (_, methods) = builder.build();
        self.insert(name.into(), methods)
    }

    fn insert(&mut self, name: String, methods: HashMap<String, MethodHandler>) -> Result<()> {
        if methods.is_empty() {
            return Err(Error::NoMethods(name));
        }
        if self.services.contains_key(&name) {
            return Err(Error::DuplicateService(name));
        }
        self.services.insert(name, methods);
        Ok(())
    }

    /// Resolve `Service.Method` and invoke its handler with `body`.
    ///
    /// Splits on the last `.`, so a service or method name containing a dot
    /// still resolves correctly.
    ///
    /// The returned future always resolves to something writable on the
    /// wire: `Ok(reply_bytes)` or `Err(message)` for the response's `Error`
    /// field. An unresolvable `Service.Method` is reported the same way a
    /// handler-returned error is, since both are per-call outcomes rather
    /// than connection failures.
    pub fn dispatch(&self, service_method: &str, body: Bytes) -> DispatchFuture {
        let Some((service, method)) = service_method.rsplit_once('.') else {
            return Box::pin(futures::future::err(
                Error::MethodNotFound(service_method.to_string()).to_string(),
            ));
        };

        let handler = self
            .services
            .get(service)
            .and_then(|methods| methods.get(method))
            .cloned();

        match handler {
            Some(handler) => Box::pin(async move { handler(body).await }),
            None => Box::pin(futures::future::err(
                Error::MethodNotFound(service_method.to_string()).to_string(),
            )),
        }
    }
}

type DispatchFuture = BoxFuture<'static, std::result::Result<Vec<u8>, String>>;
