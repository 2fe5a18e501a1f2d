//! Shared test fixtures: a connection-counting HTTP server.

#![allow(dead_code)]

pub mod capture;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

/// Connection counters observed by the server.
#[derive(Debug, Default)]
pub struct ServerStats {
    accepted: AtomicUsize,
    open: AtomicUsize,
    peak_open: AtomicUsize,
    requests: AtomicUsize,
}

impl ServerStats {
    /// Connections accepted since start.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open connections.
    pub fn peak_open(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }

    /// Requests answered.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn opened(&self) -> usize {
        let index = self.accepted.fetch_add(1, Ordering::SeqCst);
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_open.fetch_max(open, Ordering::SeqCst);
        index
    }

    fn closed(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Server behaviour knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerConfig {
    /// Delay before every response.
    pub delay: Duration,
    /// Read the first request of the first connection, then drop the socket.
    pub drop_first_connection: bool,
    /// Stop listening after this many connections; later connects are refused.
    pub accept_limit: Option<usize>,
}

/// HTTP/1.1 and h2c server answering every request with its path and query.
pub struct TestServer {
    addr: SocketAddr,
    stats: Arc<ServerStats>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_config(ServerConfig::default()).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(ServerStats::default());

        let server_stats = Arc::clone(&stats);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let stats = Arc::clone(&server_stats);
                let index = stats.opened();

                if config.drop_first_connection && index == 0 {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = stream.read(&mut buf).await;
                        drop(stream);
                        stats.closed();
                    });
                    continue;
                }

                tokio::spawn(async move {
                    let service_stats = Arc::clone(&stats);
                    let service = service_fn(move |request: Request<Incoming>| {
                        let stats = Arc::clone(&service_stats);
                        async move {
                            if !config.delay.is_zero() {
                                tokio::time::sleep(config.delay).await;
                            }
                            stats.requests.fetch_add(1, Ordering::SeqCst);
                            let body = request
                                .uri()
                                .path_and_query()
                                .map(|pq| pq.as_str().to_owned())
                                .unwrap_or_default();
                            let response = Response::builder()
                                .header("content-type", "text/plain")
                                .header("x-connection", index.to_string())
                                .body(Full::new(Bytes::from(body)))
                                .unwrap();
                            Ok::<_, Infallible>(response)
                        }
                    });
                    let _ = Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                    stats.closed();
                });

                if config.accept_limit.is_some_and(|limit| index + 1 >= limit) {
                    break;
                }
            }
        });

        Self { addr, stats }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

/// A local address nothing listens on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
