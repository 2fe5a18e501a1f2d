//! In-flight state of one request.

use std::fmt;
use std::time::Instant;

use bytes::Bytes;
use courier_core::Error;
use courier_core::error::TransportError;
use http::{Request, Response};
use http_body_util::BodyExt;
use tokio::sync::oneshot;
use tracing::{Span, debug, debug_span, field};

use super::PoolKey;
use super::connection::{ConnectionId, Sender};
use crate::metrics;

pub(crate) type Responder = oneshot::Sender<Result<Response<Bytes>, Error>>;

/// Lifecycle of a pending invocation.
///
/// `Created → ConnectionAcquired → RequestSent → Completed | Failed`.
/// An invocation still queued for a connection stays `Created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    /// Enqueued, waiting for a connection.
    Created,
    /// Assigned to a pooled connection.
    ConnectionAcquired,
    /// Written to the connection, awaiting the response.
    RequestSent,
    /// Resolved with a response.
    Completed,
    /// Resolved with an error.
    Failed,
}

impl InvocationState {
    /// Name recorded on the `courier.invocation` span.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ConnectionAcquired => "connection_acquired",
            Self::RequestSent => "request_sent",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to an invocation handed to a connection.
pub(crate) enum Outcome {
    /// The exchange finished; the result still has to be delivered.
    Resolved(Resolution),
    /// The connection was closed before the request was written; the
    /// invocation can be assigned to another connection.
    Unsent(PendingInvocation),
}

/// Result of a finished exchange, not yet handed to the caller.
///
/// Delivery is split from the exchange so the connection can be released
/// to the pool before the caller observes the response.
pub(crate) struct Resolution {
    invocation: PendingInvocation,
    result: Result<Response<Bytes>, Error>,
}

impl Resolution {
    pub(crate) fn deliver(self) {
        self.invocation.complete(self.result);
    }
}

pub(crate) struct PendingInvocation {
    request: Request<Bytes>,
    responder: Responder,
    state: InvocationState,
    span: Span,
    attempts: u8,
    pool: PoolKey,
    started: Instant,
}

impl PendingInvocation {
    pub(crate) fn new(key: &PoolKey, request: Request<Bytes>, responder: Responder) -> Self {
        let span = debug_span!(
            "courier.invocation",
            pool = %key,
            http.method = %request.method(),
            http.uri = %request.uri(),
            connection = field::Empty,
            invocation.state = InvocationState::Created.as_str(),
        );
        Self {
            request,
            responder,
            state: InvocationState::Created,
            span,
            attempts: 0,
            pool: key.clone(),
            started: Instant::now(),
        }
    }

    pub(crate) fn state(&self) -> InvocationState {
        self.state
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    fn transition(&mut self, state: InvocationState) {
        debug!(parent: &self.span, from = %self.state, to = %state, "invocation state");
        self.state = state;
        self.span.record("invocation.state", state.as_str());
        if matches!(state, InvocationState::Completed | InvocationState::Failed) {
            metrics::record_invocation(&self.pool, state, self.started.elapsed());
        }
    }

    pub(crate) fn acquired(&mut self, connection: ConnectionId) {
        self.attempts += 1;
        self.span.record("connection", connection.get());
        self.transition(InvocationState::ConnectionAcquired);
    }

    /// Resolves the invocation with `error` without touching the network.
    pub(crate) fn fail(mut self, error: impl Into<Error>) {
        self.transition(InvocationState::Failed);
        let _ = self.responder.send(Err(error.into()));
    }

    fn complete(mut self, result: Result<Response<Bytes>, Error>) {
        let state = if result.is_ok() {
            InvocationState::Completed
        } else {
            InvocationState::Failed
        };
        self.transition(state);
        // The caller may have dropped the handle; the response is discarded then.
        let _ = self.responder.send(result);
    }

    /// Runs the exchange on `sender` and hands the sender back with the outcome.
    pub(crate) async fn run(mut self, mut sender: Sender) -> (Sender, Outcome) {
        if let Err(error) = sender.ready().await {
            // Nothing was written yet: a stale connection is retried once
            // on a fresh one, a fresh connection that is already gone fails.
            if self.attempts < 2 {
                debug!(parent: &self.span, %error, "connection closed before request, requeueing");
                self.state = InvocationState::Created;
                self.span.record("invocation.state", InvocationState::Created.as_str());
                return (sender, Outcome::Unsent(self));
            }
            let result = Err(TransportError::Http(error).into());
            return (sender, self.resolved(result));
        }

        let request = sender.prepare(std::mem::take(&mut self.request));
        self.transition(InvocationState::RequestSent);
        let result = match sender.send(request).await {
            Ok(response) => {
                let (parts, body) = response.into_parts();
                match body.collect().await {
                    Ok(collected) => Ok(Response::from_parts(parts, collected.to_bytes())),
                    Err(error) => Err(TransportError::Http(error).into()),
                }
            }
            Err(error) => Err(TransportError::Http(error).into()),
        };
        (sender, self.resolved(result))
    }

    fn resolved(self, result: Result<Response<Bytes>, Error>) -> Outcome {
        Outcome::Resolved(Resolution {
            invocation: self,
            result,
        })
    }
}
