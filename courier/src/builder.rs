//! Client construction.

use std::fmt;
use std::sync::Arc;

use courier_core::{
    BuildError, Contract, Decoder, DefaultContract, Encoder, ErrorDecoder, Interface,
    RequestInterceptor, Target,
};
use tracing::debug;

use crate::codec::{DefaultDecoder, DefaultErrorDecoder, JsonEncoder};
use crate::config::ClientOptions;
use crate::dispatch::{Client, Dispatcher};
use crate::engine::HttpEngine;
use crate::registry::{DispatchTable, HttpHandlerFactory};

/// Entry point for building clients.
#[derive(Debug, Clone, Copy)]
pub struct Courier;

impl Courier {
    /// Creates a builder with default options and collaborators.
    pub fn builder() -> CourierBuilder {
        CourierBuilder::default()
    }
}

/// Collects options and collaborators, then builds clients.
///
/// Clients built from one builder share its engine, and therefore its
/// connection pools. When no engine is supplied, the first build creates
/// one on the current tokio runtime and keeps it for later builds.
///
/// ```no_run
/// use courier::{Courier, HttpProtocol, ClientOptions, Interface, MethodSpec, Param};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let mut builder = Courier::builder().options(
///     ClientOptions::builder()
///         .protocol(HttpProtocol::Http2)
///         .max_pool_size(1)
///         .build(),
/// );
/// let interface = Interface::new("HelloService")
///     .method(MethodSpec::get("hello", "/hello/{name}").param(Param::path("name")));
/// let dispatcher = builder.dispatcher(interface, "http://localhost:8091")?;
/// let greeting: String = dispatcher
///     .invoke("hello", vec![serde_json::json!("world")])
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CourierBuilder {
    options: ClientOptions,
    engine: Option<HttpEngine>,
    contract: Arc<dyn Contract>,
    encoder: Arc<dyn Encoder>,
    decoder: Arc<dyn Decoder>,
    error_decoder: Arc<dyn ErrorDecoder>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

impl Default for CourierBuilder {
    fn default() -> Self {
        Self {
            options: ClientOptions::default(),
            engine: None,
            contract: Arc::new(DefaultContract),
            encoder: Arc::new(JsonEncoder),
            decoder: Arc::new(DefaultDecoder),
            error_decoder: Arc::new(DefaultErrorDecoder),
            interceptors: Vec::new(),
        }
    }
}

impl CourierBuilder {
    /// Set the transport options. Ignored when an engine is supplied.
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Use an existing engine (and its pools).
    pub fn engine(mut self, engine: HttpEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the contract collaborator.
    pub fn contract(mut self, contract: impl Contract + 'static) -> Self {
        self.contract = Arc::new(contract);
        self
    }

    /// Set the body encoder.
    pub fn encoder(mut self, encoder: impl Encoder + 'static) -> Self {
        self.encoder = Arc::new(encoder);
        self
    }

    /// Set the success response decoder.
    pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Set the decoder for non-success responses.
    pub fn error_decoder(mut self, error_decoder: impl ErrorDecoder + 'static) -> Self {
        self.error_decoder = Arc::new(error_decoder);
        self
    }

    /// Add a request interceptor. Interceptors run in the order they were added.
    pub fn interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Builds a typed client bound to `url`.
    pub fn target<C: Client>(&mut self, url: &str) -> Result<C, BuildError> {
        self.dispatcher(C::interface(), url).map(C::from_dispatcher)
    }

    /// Builds a dispatcher for `interface` bound to `url`.
    ///
    /// The interface is parsed by the contract and one handler is created
    /// per method before this returns.
    pub fn dispatcher(&mut self, interface: Interface, url: &str) -> Result<Dispatcher, BuildError> {
        let target = Target::new(interface.name(), url)?;
        let metadata = self.contract.parse(&interface)?;
        let factory = HttpHandlerFactory {
            engine: self.shared_engine()?,
            encoder: Arc::clone(&self.encoder),
            decoder: Arc::clone(&self.decoder),
            error_decoder: Arc::clone(&self.error_decoder),
            interceptors: self.interceptors.iter().cloned().collect(),
        };
        let table = DispatchTable::build(&target, metadata, &factory)?;
        debug!(%target, methods = table.len(), "client built");
        Ok(Dispatcher::new(target, interface, table))
    }

    fn shared_engine(&mut self) -> Result<HttpEngine, BuildError> {
        match &self.engine {
            Some(engine) => Ok(engine.clone()),
            None => {
                let engine = HttpEngine::new(self.options.clone())?;
                self.engine = Some(engine.clone());
                Ok(engine)
            }
        }
    }
}

impl fmt::Debug for CourierBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CourierBuilder")
            .field("options", &self.options)
            .field("engine", &self.engine)
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}
