//! Method handler registry.
//!
//! A [`DispatchTable`] maps every declared method name to the
//! [`MethodHandler`] that executes it. Tables are built eagerly when a client
//! is created and never change afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use courier_core::{
    Arguments, BuildError, Decoder, Encoder, Error, ErrorDecoder, MethodMetadata,
    RequestInterceptor, ResponseFuture, Target,
};
use serde_json::Value;
use smol_str::SmolStr;
use tracing::trace;

use crate::engine::HttpEngine;

/// Executes calls of one declared method.
pub trait MethodHandler: Send + Sync {
    /// Starts an invocation with `args`.
    ///
    /// Errors returned here (binding, encoding) are delivered to the caller
    /// through an already-failed handle by the dispatcher.
    fn invoke(&self, args: Arguments) -> Result<ResponseFuture<Value>, Error>;
}

/// Creates the handler for one method at build time.
pub trait HandlerFactory {
    /// Builds the handler for `metadata`, bound to `target`.
    fn create(&self, target: &Target, metadata: MethodMetadata) -> Arc<dyn MethodHandler>;
}

/// Handler that turns a call into an HTTP request on the shared engine.
pub struct HttpMethodHandler {
    metadata: MethodMetadata,
    target: Target,
    engine: HttpEngine,
    encoder: Arc<dyn Encoder>,
    decoder: Arc<dyn Decoder>,
    error_decoder: Arc<dyn ErrorDecoder>,
    interceptors: Arc<[Arc<dyn RequestInterceptor>]>,
}

impl MethodHandler for HttpMethodHandler {
    fn invoke(&self, args: Arguments) -> Result<ResponseFuture<Value>, Error> {
        let mut request = self
            .metadata
            .template
            .resolve(&self.target, &args, self.encoder.as_ref())?;
        for interceptor in self.interceptors.iter() {
            interceptor.apply(&mut request);
        }
        trace!(method = %self.metadata.name, uri = %request.uri(), "request resolved");

        let method = self.metadata.name.clone();
        let decoder = Arc::clone(&self.decoder);
        let error_decoder = Arc::clone(&self.error_decoder);
        Ok(self.engine.execute(request).and_then(move |response| {
            if response.status().is_success() {
                Ok(decoder.decode(response)?)
            } else {
                Err(error_decoder.decode(&method, response))
            }
        }))
    }
}

impl fmt::Debug for HttpMethodHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMethodHandler")
            .field("method", &self.metadata.name)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Default factory: binds every method to the engine and codecs it holds.
#[derive(Clone)]
pub struct HttpHandlerFactory {
    pub(crate) engine: HttpEngine,
    pub(crate) encoder: Arc<dyn Encoder>,
    pub(crate) decoder: Arc<dyn Decoder>,
    pub(crate) error_decoder: Arc<dyn ErrorDecoder>,
    pub(crate) interceptors: Arc<[Arc<dyn RequestInterceptor>]>,
}

impl HandlerFactory for HttpHandlerFactory {
    fn create(&self, target: &Target, metadata: MethodMetadata) -> Arc<dyn MethodHandler> {
        Arc::new(HttpMethodHandler {
            metadata,
            target: target.clone(),
            engine: self.engine.clone(),
            encoder: Arc::clone(&self.encoder),
            decoder: Arc::clone(&self.decoder),
            error_decoder: Arc::clone(&self.error_decoder),
            interceptors: Arc::clone(&self.interceptors),
        })
    }
}

/// Immutable method name → handler table.
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: HashMap<SmolStr, Arc<dyn MethodHandler>>,
}

impl DispatchTable {
    /// Builds a table from explicit `(method, handler)` pairs.
    ///
    /// Fails if a method name appears twice.
    pub fn new<I>(interface: &str, handlers: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = (SmolStr, Arc<dyn MethodHandler>)>,
    {
        let mut table = HashMap::new();
        for (method, handler) in handlers {
            if table.insert(method.clone(), handler).is_some() {
                return Err(BuildError::DuplicateMethod {
                    interface: interface.into(),
                    method,
                });
            }
        }
        Ok(Self { handlers: table })
    }

    /// Creates one handler per method with `factory`.
    pub fn build<F>(target: &Target, metadata: Vec<MethodMetadata>, factory: &F) -> Result<Self, BuildError>
    where
        F: HandlerFactory + ?Sized,
    {
        let interface = metadata
            .first()
            .map(|method| method.interface.clone())
            .unwrap_or_else(|| SmolStr::new(target.name()));
        let handlers = metadata.into_iter().map(|method| {
            let name = method.name.clone();
            (name, factory.create(target, method))
        });
        Self::new(&interface, handlers)
    }

    /// Handler for `method`.
    pub fn get(&self, method: &str) -> Option<&Arc<dyn MethodHandler>> {
        self.handlers.get(method)
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no method is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered method names, in no particular order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(SmolStr::as_str)
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.methods().collect();
        methods.sort_unstable();
        f.debug_struct("DispatchTable")
            .field("methods", &methods)
            .finish()
    }
}
