//! Encoding and decoding collaborators.
//!
//! Implementations live outside the core; `courier` bundles JSON and plain
//! text ones.

use bytes::Bytes;
use http::{HeaderMap, Request, Response};
use serde_json::Value;

use crate::error::{DecodeError, EncodeError, Error};

/// Encodes a body argument into request bytes.
pub trait Encoder: Send + Sync {
    /// Encodes `body`, setting content headers as needed.
    fn encode(&self, body: &Value, headers: &mut HeaderMap) -> Result<Bytes, EncodeError>;
}

/// Decodes a successful response into a JSON value.
///
/// The dispatcher converts the value into the caller's declared type.
pub trait Decoder: Send + Sync {
    /// Decodes `response`.
    fn decode(&self, response: Response<Bytes>) -> Result<Value, DecodeError>;
}

/// Turns a non-success response into an [`Error`].
pub trait ErrorDecoder: Send + Sync {
    /// Builds the error returned for `response` to a call of `method`.
    fn decode(&self, method: &str, response: Response<Bytes>) -> Error;
}

/// Mutates every request before it is executed.
///
/// Interceptors run in registration order, after the template is resolved.
pub trait RequestInterceptor: Send + Sync {
    /// Applies the interceptor to `request`.
    fn apply(&self, request: &mut Request<Bytes>);
}

impl<F> RequestInterceptor for F
where
    F: Fn(&mut Request<Bytes>) + Send + Sync,
{
    fn apply(&self, request: &mut Request<Bytes>) {
        self(request)
    }
}
