//! Pooled transport connections.

use std::fmt;

use bytes::Bytes;
use courier_core::error::TransportError;
use http::header::{HOST, HeaderValue};
use http::{Request, Response, Uri};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::client::conn::{http1, http2};
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use super::PoolKey;
use super::pool::PoolEvent;
use crate::config::{ClientOptions, HttpProtocol};

/// Identifier of a connection within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Request half of a hyper client connection.
pub(crate) enum Sender {
    Http1(http1::SendRequest<Full<Bytes>>),
    Http2(http2::SendRequest<Full<Bytes>>),
}

impl Sender {
    pub(crate) fn is_closed(&self) -> bool {
        match self {
            Self::Http1(sender) => sender.is_closed(),
            Self::Http2(sender) => sender.is_closed(),
        }
    }

    /// A sender for one more request, if the connection can carry it now.
    ///
    /// HTTP/2 senders are cloned (streams are multiplexed); HTTP/1.1 senders
    /// can't be shared and are moved out by the caller instead.
    pub(crate) fn share(&self) -> Option<Self> {
        match self {
            Self::Http1(_) => None,
            Self::Http2(sender) => Some(Self::Http2(sender.clone())),
        }
    }

    pub(crate) async fn ready(&mut self) -> Result<(), hyper::Error> {
        match self {
            Self::Http1(sender) => sender.ready().await,
            Self::Http2(sender) => sender.ready().await,
        }
    }

    /// Adapts a resolved request to the connection's protocol.
    ///
    /// HTTP/1.1 requests use origin-form with a `Host` header; HTTP/2 keeps
    /// the absolute URI for the `:scheme`/`:authority` pseudo headers.
    pub(crate) fn prepare(&self, request: Request<Bytes>) -> Request<Full<Bytes>> {
        let (mut parts, body) = request.into_parts();
        if let Self::Http1(_) = self {
            if let Some(authority) = parts.uri.authority()
                && !parts.headers.contains_key(HOST)
                && let Ok(host) = HeaderValue::from_str(authority.as_str())
            {
                parts.headers.insert(HOST, host);
            }
            if let Some(origin) = parts
                .uri
                .path_and_query()
                .and_then(|path| path.as_str().parse::<Uri>().ok())
            {
                parts.uri = origin;
            }
        }
        Request::from_parts(parts, Full::new(body))
    }

    pub(crate) async fn send(
        &mut self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<Incoming>, hyper::Error> {
        match self {
            Self::Http1(sender) => sender.send_request(request).await,
            Self::Http2(sender) => sender.send_request(request).await,
        }
    }
}

/// Opens a connection to `key` and spawns its driver task.
///
/// The driver reports [`PoolEvent::Closed`] once the connection ends, for
/// whatever reason.
pub(crate) async fn connect(
    key: PoolKey,
    id: ConnectionId,
    options: &ClientOptions,
    events: UnboundedSender<PoolEvent>,
) -> Result<Sender, TransportError> {
    let address = key.socket_address();
    trace!(%key, connection = %id, %address, "connecting");
    let connecting = TcpStream::connect(address);
    let stream = match options.connect_timeout {
        Some(timeout) => tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| TransportError::ConnectTimeout)??,
        None => connecting.await?,
    };
    stream.set_nodelay(true)?;
    let io = TokioIo::new(stream);

    match options.protocol {
        HttpProtocol::Http1 => {
            let (sender, connection) = http1::handshake(io).await?;
            tokio::spawn(async move {
                if let Err(error) = connection.await {
                    debug!(%key, connection = %id, %error, "connection terminated");
                }
                let _ = events.send(PoolEvent::Closed(id));
            });
            Ok(Sender::Http1(sender))
        }
        HttpProtocol::Http2 => {
            let (sender, connection) = http2::Builder::new(TokioExecutor::new())
                .handshake(io)
                .await?;
            tokio::spawn(async move {
                if let Err(error) = connection.await {
                    debug!(%key, connection = %id, %error, "connection terminated");
                }
                let _ = events.send(PoolEvent::Closed(id));
            });
            Ok(Sender::Http2(sender))
        }
    }
}
