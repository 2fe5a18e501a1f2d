//! Dispatch proxy.
//!
//! A [`Dispatcher`] sits behind every client handle. Identity questions
//! (equality, hashing, display) are answered from its [`Target`] alone;
//! request methods are checked against their declared return kind and
//! routed to the handler registered for them.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use courier_core::error::{DecodeError, ResolutionError};
use courier_core::{
    Arguments, ContractViolation, Error, Interface, ResponseFuture, ReturnKind, Target,
};
use serde::de::DeserializeOwned;
use tracing::{debug, debug_span, error};

use crate::registry::DispatchTable;

/// A typed client generated over a [`Dispatcher`].
///
/// Implementations describe their methods once in [`interface`](Self::interface)
/// and forward every method call to [`Dispatcher::invoke`]. Deriving
/// `PartialEq`, `Hash` and `Display` from the wrapped dispatcher gives the
/// client target-based identity.
///
/// ```
/// use courier::{Client, Dispatcher, Interface, MethodSpec, Param, ResponseFuture};
/// use serde_json::json;
///
/// #[derive(Clone, PartialEq, Eq, Hash)]
/// struct Books(Dispatcher);
///
/// impl Client for Books {
///     fn interface() -> Interface {
///         Interface::new("Books")
///             .method(MethodSpec::get("title", "/books/{id}/title").param(Param::path("id")))
///     }
///
///     fn from_dispatcher(dispatcher: Dispatcher) -> Self {
///         Self(dispatcher)
///     }
/// }
///
/// impl Books {
///     fn title(&self, id: u64) -> ResponseFuture<String> {
///         self.0.invoke("title", vec![json!(id)])
///     }
/// }
/// ```
pub trait Client: Sized {
    /// Declaration of the client's methods.
    fn interface() -> Interface;

    /// Wraps a dispatcher built for [`interface`](Self::interface).
    fn from_dispatcher(dispatcher: Dispatcher) -> Self;
}

/// Routes method calls of one client to their handlers.
///
/// Cheap to clone: the interface and the dispatch table are shared.
#[derive(Clone)]
pub struct Dispatcher {
    target: Target,
    interface: Arc<Interface>,
    table: Arc<DispatchTable>,
}

impl Dispatcher {
    /// Creates a dispatcher over a prebuilt table.
    pub fn new(target: Target, interface: Interface, table: DispatchTable) -> Self {
        Self {
            target,
            interface: Arc::new(interface),
            table: Arc::new(table),
        }
    }

    /// Target this dispatcher sends requests to.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Interface the dispatcher was built for.
    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    /// Handler table.
    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Invokes `method` with `args` and returns the pending result.
    ///
    /// Every failure after the return-kind check, including a panic inside
    /// the handler, is delivered through the returned handle.
    ///
    /// # Panics
    ///
    /// Panics if `method` is declared with a return kind other than
    /// [`ReturnKind::Future`]. The panic payload is the [`ContractViolation`]
    /// itself, so it can be recovered with `catch_unwind` and downcast. Use
    /// [`try_invoke`](Self::try_invoke) to get the violation as a value.
    pub fn invoke<T>(&self, method: &str, args: Arguments) -> ResponseFuture<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        match self.try_invoke(method, args) {
            Ok(response) => response,
            Err(violation) => panic::panic_any(violation),
        }
    }

    /// Like [`invoke`](Self::invoke), but reports a contract violation
    /// instead of panicking.
    pub fn try_invoke<T>(
        &self,
        method: &str,
        args: Arguments,
    ) -> Result<ResponseFuture<T>, ContractViolation>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let span = debug_span!("courier.invoke", method, target = %self.target);
        let _entered = span.enter();

        if let Some(spec) = self.interface.find(method)
            && let ReturnKind::Value(declared) = spec.return_kind()
        {
            let violation = ContractViolation {
                interface: self.interface.name().into(),
                method: method.into(),
                declared: declared.clone(),
            };
            error!(%violation, "contract violation");
            return Err(violation);
        }

        let Some(handler) = self.table.get(method) else {
            debug!("no handler registered");
            return Ok(ResponseFuture::failed(
                ResolutionError::UnknownMethod {
                    interface: self.interface.name().into(),
                    method: method.into(),
                }
                .into(),
            ));
        };

        let response = match panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(args))) {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                debug!(%error, "invocation failed before execution");
                return Ok(ResponseFuture::failed(error));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%message, "method handler panicked");
                return Ok(ResponseFuture::failed(Error::Handler(message)));
            }
        };

        Ok(response.and_then(|value| {
            serde_json::from_value(value).map_err(|err| Error::Decoding(DecodeError::Json(err)))
        }))
    }

    /// Identity comparison against an arbitrary value.
    ///
    /// Returns `false` for anything that is not a [`Dispatcher`].
    pub fn equals(&self, other: &dyn Any) -> bool {
        other
            .downcast_ref::<Self>()
            .is_some_and(|other| other == self)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

impl PartialEq for Dispatcher {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl Eq for Dispatcher {}

impl Hash for Dispatcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target.hash(state);
    }
}

impl fmt::Display for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.target, f)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("target", &self.target)
            .field("table", &self.table)
            .finish()
    }
}
