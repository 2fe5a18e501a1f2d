//! Transport options consumed by the execution engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::BuildError;

/// HTTP protocol spoken on pooled connections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
pub enum HttpProtocol {
    /// HTTP/1.1; one request at a time per connection.
    #[default]
    Http1,
    /// HTTP/2 with prior knowledge (h2c); requests are multiplexed.
    Http2,
}

/// Client transport options.
///
/// Can be deserialized from configuration files; durations use the
/// human-readable format (`"500ms"`, `"5s"`).
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ClientOptions {
    /// Protocol version used for every connection.
    #[serde(default)]
    pub protocol: HttpProtocol,
    /// Upper bound of open connections per endpoint.
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    /// Requests multiplexed on one HTTP/2 connection before another is opened.
    #[serde(default = "default_max_concurrent_streams")]
    pub max_concurrent_streams: usize,
    /// Time allowed to establish a TCP connection.
    #[serde(default, with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
}

fn default_max_pool_size() -> usize {
    5
}

fn default_max_concurrent_streams() -> usize {
    100
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            protocol: HttpProtocol::default(),
            max_pool_size: default_max_pool_size(),
            max_concurrent_streams: default_max_concurrent_streams(),
            connect_timeout: None,
        }
    }
}

impl ClientOptions {
    /// Create a new builder for ClientOptions.
    pub fn builder() -> ClientOptionsBuilder {
        ClientOptionsBuilder::default()
    }

    /// Requests one connection may carry at the same time.
    pub(crate) fn connection_capacity(&self) -> usize {
        match self.protocol {
            HttpProtocol::Http1 => 1,
            HttpProtocol::Http2 => self.max_concurrent_streams,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), BuildError> {
        if self.max_pool_size == 0 {
            return Err(BuildError::InvalidOptions(
                "max_pool_size must be at least 1".to_owned(),
            ));
        }
        if self.max_concurrent_streams == 0 {
            return Err(BuildError::InvalidOptions(
                "max_concurrent_streams must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Builder for ClientOptions.
#[derive(Debug, Clone, Default)]
pub struct ClientOptionsBuilder {
    options: ClientOptions,
}

impl ClientOptionsBuilder {
    /// Set the protocol version.
    pub fn protocol(mut self, protocol: HttpProtocol) -> Self {
        self.options.protocol = protocol;
        self
    }

    /// Set the connection pool bound.
    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.options.max_pool_size = size;
        self
    }

    /// Set the HTTP/2 stream limit per connection.
    pub fn max_concurrent_streams(mut self, streams: usize) -> Self {
        self.options.max_concurrent_streams = streams;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = Some(timeout);
        self
    }

    /// Build the ClientOptions.
    pub fn build(self) -> ClientOptions {
        self.options
    }
}
