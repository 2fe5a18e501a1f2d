#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Client construction.
///
/// [`Courier::builder()`] collects transport options and collaborators and
/// builds [`Dispatcher`]s (or typed [`Client`]s) that share one engine.
pub mod builder;

/// Bundled JSON and text codecs.
pub mod codec;

/// Transport options.
///
/// [`ClientOptions`] configures the protocol and the connection pool bound;
/// it can be loaded from configuration files with serde.
pub mod config;

/// Dispatch proxy.
///
/// Routes calls on a client handle to the registered method handlers and
/// answers identity questions from the client's [`Target`].
pub mod dispatch;

/// Async HTTP execution engine with per-endpoint bounded connection pools.
pub mod engine;

/// Metrics collection for pool observability.
///
/// When the `metrics` feature is enabled, this module provides counters
/// and gauges for:
/// - Connections opened, closed and failed per endpoint
/// - Queued invocations per endpoint
/// - Resolved invocations and their duration
pub mod metrics;

/// Method handler registry.
pub mod registry;

pub use builder::{Courier, CourierBuilder};
pub use codec::{DefaultDecoder, DefaultErrorDecoder, JsonDecoder, JsonEncoder, StringDecoder};
pub use config::{ClientOptions, ClientOptionsBuilder, HttpProtocol};
pub use dispatch::{Client, Dispatcher};
pub use engine::{HttpEngine, InvocationState, PoolStats};
pub use registry::{DispatchTable, HandlerFactory, HttpHandlerFactory, MethodHandler};

pub use courier_core::{
    Arguments, BuildError, Contract, ContractViolation, Decoder, DefaultContract, Encoder, Error,
    ErrorDecoder, Interface, MethodMetadata, MethodSpec, Param, RequestInterceptor,
    RequestTemplate, ResponseFuture, ReturnKind, Target, error,
};
