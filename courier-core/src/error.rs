//! Error taxonomy shared by the dispatcher, the handlers and the engine.
//!
//! Everything a request method can fail with is an [`Error`] and reaches the
//! caller through the [`ResponseFuture`](crate::ResponseFuture). The only
//! exception is [`ContractViolation`], which signals a declaration defect and
//! is raised synchronously by the dispatcher.

use bytes::Bytes;
use http::StatusCode;
use smol_str::SmolStr;
use thiserror::Error;

/// A request method was declared with a return type other than a response future.
///
/// This is a programming error in the interface declaration. The dispatcher
/// raises it before any request is built, so it is never delivered through
/// a [`ResponseFuture`](crate::ResponseFuture).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Method {method} of contract {interface} doesn't return courier::ResponseFuture (declared {declared})")]
pub struct ContractViolation {
    /// Interface (contract) name.
    pub interface: SmolStr,
    /// Method name.
    pub method: SmolStr,
    /// Declared return type.
    pub declared: SmolStr,
}

/// Failure of a single request-method invocation.
#[derive(Debug, Error)]
pub enum Error {
    /// The method handler could not be located or the arguments could not be bound.
    #[error(transparent)]
    HandlerResolution(#[from] ResolutionError),
    /// The request body could not be encoded.
    #[error(transparent)]
    Encoding(#[from] EncodeError),
    /// The response could not be decoded into the declared type.
    #[error(transparent)]
    Decoding(#[from] DecodeError),
    /// Network or connection-pool failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The endpoint answered with a non-success status.
    #[error("status {status} reading {method}")]
    Status {
        /// Method that issued the request.
        method: SmolStr,
        /// Response status.
        status: StatusCode,
        /// Raw response body.
        body: Bytes,
    },
    /// A method handler panicked while building the request.
    #[error("method handler panicked: {0}")]
    Handler(String),
}

impl Error {
    /// Returns `true` for transport-level failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns the response status for [`Error::Status`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Dispatch table lookup or argument binding failure.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// No handler is registered for the method.
    #[error("no handler for method {method} of contract {interface}")]
    UnknownMethod {
        /// Interface name.
        interface: SmolStr,
        /// Requested method.
        method: SmolStr,
    },
    /// The call supplied a different number of arguments than the method declares.
    #[error("method {method} expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        /// Method name.
        method: SmolStr,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        actual: usize,
    },
    /// A path placeholder has no argument bound to it.
    #[error("placeholder {{{0}}} is not bound")]
    UnboundPlaceholder(SmolStr),
    /// An argument can't be rendered into its request position.
    #[error("argument {name} can't be bound: {reason}")]
    InvalidArgument {
        /// Parameter name.
        name: SmolStr,
        /// Why the value was rejected.
        reason: String,
    },
    /// The expanded request URI is invalid.
    #[error("invalid request uri: {0}")]
    InvalidUri(#[from] http::Error),
}

/// Request body encoding failure.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// JSON serialization error.
    #[error("json encode error: {0}")]
    Json(#[from] serde_json::Error),
    /// The encoder doesn't support the given value.
    #[error("unsupported body: {0}")]
    Unsupported(String),
}

/// Response decoding failure.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// JSON deserialization error.
    #[error("json decode error: {0}")]
    Json(#[from] serde_json::Error),
    /// The body is not valid UTF-8.
    #[error("response body is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Connection-level failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The TCP connection could not be established.
    #[error("connect error: {0}")]
    Connect(#[from] std::io::Error),
    /// HTTP protocol error reported by the connection.
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),
    /// Connection establishment exceeded the configured timeout.
    #[error("connect timed out")]
    ConnectTimeout,
    /// Only plain `http` targets are supported.
    #[error("unsupported scheme in {0}")]
    UnsupportedScheme(String),
    /// The pool serving this endpoint was shut down.
    #[error("connection pool closed")]
    PoolClosed,
}

/// Client construction failure.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The target URL can't be parsed or lacks scheme/authority.
    #[error("invalid target url {url}: {reason}")]
    InvalidTarget {
        /// Offending URL.
        url: String,
        /// Parse failure description.
        reason: String,
    },
    /// Two methods share the same name.
    #[error("method {method} of contract {interface} is declared twice")]
    DuplicateMethod {
        /// Interface name.
        interface: SmolStr,
        /// Duplicated method name.
        method: SmolStr,
    },
    /// A method declaration is inconsistent with its request template.
    #[error("method {method} of contract {interface}: {reason}")]
    InvalidMethod {
        /// Interface name.
        interface: SmolStr,
        /// Method name.
        method: SmolStr,
        /// What is wrong.
        reason: String,
    },
    /// Invalid client options.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    /// The client must be built inside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
