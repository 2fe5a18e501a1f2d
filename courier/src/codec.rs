//! Bundled encoders and decoders.

use bytes::Bytes;
use courier_core::error::{DecodeError, EncodeError};
use courier_core::{Decoder, Encoder, Error, ErrorDecoder};
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http::Response;
use serde_json::Value;

/// Encodes the body argument as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn encode(&self, body: &Value, headers: &mut HeaderMap) -> Result<Bytes, EncodeError> {
        let encoded = serde_json::to_vec(body)?;
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
        Ok(Bytes::from(encoded))
    }
}

/// Decodes the body as JSON; an empty body decodes to `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, response: Response<Bytes>) -> Result<Value, DecodeError> {
        let body = response.into_body();
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Decodes the body as a UTF-8 string.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringDecoder;

impl Decoder for StringDecoder {
    fn decode(&self, response: Response<Bytes>) -> Result<Value, DecodeError> {
        let text = String::from_utf8(response.into_body().to_vec())?;
        Ok(Value::String(text))
    }
}

/// JSON for `application/json` (and `+json`) responses, text otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDecoder;

impl Decoder for DefaultDecoder {
    fn decode(&self, response: Response<Bytes>) -> Result<Value, DecodeError> {
        if response.body().is_empty() {
            return Ok(Value::Null);
        }
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .is_some_and(|mime| {
                let mime = mime.trim();
                mime == "application/json" || mime.ends_with("+json")
            });
        if is_json {
            JsonDecoder.decode(response)
        } else {
            StringDecoder.decode(response)
        }
    }
}

/// Maps every non-success response to [`Error::Status`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorDecoder;

impl ErrorDecoder for DefaultErrorDecoder {
    fn decode(&self, method: &str, response: Response<Bytes>) -> Error {
        let status = response.status();
        Error::Status {
            method: method.into(),
            status,
            body: response.into_body(),
        }
    }
}
