//! Async HTTP execution engine.
//!
//! [`HttpEngine`] accepts resolved requests and returns a [`ResponseFuture`]
//! right away. Requests are grouped by endpoint ([`PoolKey`]); every endpoint
//! gets its own bounded connection pool driven by a dedicated worker task,
//! so repeated calls through one client reuse connections instead of opening
//! a new one per call.
//!
//! ```no_run
//! use bytes::Bytes;
//! use courier::engine::HttpEngine;
//! use courier::{ClientOptions, HttpProtocol};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ClientOptions::builder()
//!     .protocol(HttpProtocol::Http2)
//!     .max_pool_size(1)
//!     .build();
//! let engine = HttpEngine::new(options)?;
//!
//! let request = http::Request::get("http://localhost:8080/ping").body(Bytes::new())?;
//! let response = engine.execute(request).await?;
//! assert!(response.status().is_success());
//! # Ok(())
//! # }
//! ```

mod connection;
mod invocation;
mod pool;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use courier_core::error::TransportError;
use courier_core::{BuildError, ResponseFuture};
use dashmap::DashMap;
use http::uri::{Authority, Scheme};
use http::{Request, Response, Uri};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::debug;

pub use connection::ConnectionId;
pub use invocation::InvocationState;

use crate::config::ClientOptions;
use invocation::PendingInvocation;
use pool::PoolHandle;

/// Endpoint a pool serves: scheme and authority of the request URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    scheme: Scheme,
    authority: Authority,
}

impl PoolKey {
    /// Extracts the endpoint of `uri`.
    ///
    /// Only absolute `http` URIs are accepted.
    pub fn from_uri(uri: &Uri) -> Result<Self, TransportError> {
        match (uri.scheme(), uri.authority()) {
            (Some(scheme), Some(authority)) if *scheme == Scheme::HTTP => Ok(Self {
                scheme: scheme.clone(),
                authority: authority.clone(),
            }),
            _ => Err(TransportError::UnsupportedScheme(uri.to_string())),
        }
    }

    pub(crate) fn socket_address(&self) -> String {
        format!(
            "{}:{}",
            self.authority.host(),
            self.authority.port_u16().unwrap_or(80)
        )
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

/// Point-in-time counters of one endpoint pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently open.
    pub open: usize,
    /// Highest number of simultaneously open connections.
    pub peak_open: usize,
    /// Connection attempts in progress.
    pub connecting: usize,
    /// Connections opened over the pool lifetime.
    pub opened: usize,
    /// Connections closed over the pool lifetime.
    pub closed: usize,
    /// Invocations waiting for a connection.
    pub queued: usize,
    /// Invocations assigned to a connection and not yet resolved.
    pub in_flight: usize,
}

/// Executes requests over per-endpoint bounded connection pools.
///
/// Cloning is cheap; clones share the pools. Pools stop when
/// [`shutdown`](Self::shutdown) is called or the last clone is dropped.
#[derive(Clone)]
pub struct HttpEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    options: Arc<ClientOptions>,
    runtime: Handle,
    pools: DashMap<PoolKey, PoolHandle>,
    closed: AtomicBool,
}

impl HttpEngine {
    /// Creates an engine on the current tokio runtime.
    pub fn new(options: ClientOptions) -> Result<Self, BuildError> {
        Self::with_runtime(options, Handle::try_current()?)
    }

    /// Creates an engine whose pool workers run on `runtime`.
    pub fn with_runtime(options: ClientOptions, runtime: Handle) -> Result<Self, BuildError> {
        options.validate()?;
        debug!(?options, "http engine created");
        Ok(Self {
            inner: Arc::new(EngineInner {
                options: Arc::new(options),
                runtime,
                pools: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Options every pool of this engine uses.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Enqueues `request` and returns a handle to its response.
    ///
    /// The request is queued before this returns, so requests to one
    /// endpoint are assigned to connections in call order. The response
    /// body is fully read before the handle resolves.
    pub fn execute(&self, request: Request<Bytes>) -> ResponseFuture<Response<Bytes>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return ResponseFuture::failed(TransportError::PoolClosed.into());
        }
        let key = match PoolKey::from_uri(request.uri()) {
            Ok(key) => key,
            Err(error) => return ResponseFuture::failed(error.into()),
        };

        let (responder, receiver) = oneshot::channel();
        let invocation = PendingInvocation::new(&key, request, responder);
        self.pool(key).submit(invocation);

        ResponseFuture::new(async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(TransportError::PoolClosed.into()))
        })
    }

    /// Counters of the pool serving the endpoint of `uri`, if one exists.
    pub fn stats(&self, uri: &Uri) -> Option<PoolStats> {
        let key = PoolKey::from_uri(uri).ok()?;
        self.inner.pools.get(&key).map(|pool| pool.stats())
    }

    /// Stops every pool.
    ///
    /// Queued invocations fail with [`TransportError::PoolClosed`]; requests
    /// already written to a connection still complete. Later calls to
    /// [`execute`](Self::execute) fail immediately.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for pool in self.inner.pools.iter() {
            debug!(pool = %pool.key(), "shutting down pool");
            pool.shutdown();
        }
        self.inner.pools.clear();
    }

    #[cfg(test)]
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn pool(&self, key: PoolKey) -> PoolHandle {
        let spawn_key = key.clone();
        self.inner
            .pools
            .entry(key)
            .or_insert_with(|| {
                PoolHandle::spawn(spawn_key, Arc::clone(&self.inner.options), &self.inner.runtime)
            })
            .value()
            .clone()
    }
}

impl fmt::Debug for HttpEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpEngine")
            .field("options", &self.inner.options)
            .field("pools", &self.inner.pools.len())
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}
