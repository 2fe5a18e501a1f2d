//! Declarative interface description and the contract collaborator.
//!
//! An [`Interface`] lists the request methods of a client together with their
//! request templates. A [`Contract`] turns that declaration into validated
//! [`MethodMetadata`], one entry per method, which the registry binds into
//! method handlers.

use std::collections::HashSet;
use std::sync::Arc;

use http::{HeaderName, HeaderValue, Method};
use smol_str::SmolStr;

use crate::error::BuildError;
use crate::template::RequestTemplate;

/// Declared return kind of an interface method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnKind {
    /// The method returns a [`ResponseFuture`](crate::ResponseFuture).
    Future,
    /// The method returns a plain value of the named type.
    ///
    /// Calling such a method through the dispatcher is a contract violation.
    Value(SmolStr),
}

/// Where a positional argument goes in the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// Substitutes `{name}` in the path template.
    Path(SmolStr),
    /// Appended to the query string as `name=value`.
    Query(SmolStr),
    /// Sent as the `name` request header.
    Header(SmolStr),
    /// Encoded as the request body.
    Body,
}

impl Param {
    /// Path parameter.
    pub fn path(name: impl Into<SmolStr>) -> Self {
        Self::Path(name.into())
    }

    /// Query parameter.
    pub fn query(name: impl Into<SmolStr>) -> Self {
        Self::Query(name.into())
    }

    /// Header parameter.
    pub fn header(name: impl Into<SmolStr>) -> Self {
        Self::Header(name.into())
    }

    /// Body parameter.
    pub fn body() -> Self {
        Self::Body
    }
}

/// Declaration of one interface method.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub(crate) name: SmolStr,
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) params: Vec<Param>,
    pub(crate) headers: Vec<(SmolStr, String)>,
    pub(crate) returns: ReturnKind,
}

impl MethodSpec {
    /// Declares a method issuing `method` requests to `path`.
    pub fn new(name: impl Into<SmolStr>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            params: Vec::new(),
            headers: Vec::new(),
            returns: ReturnKind::Future,
        }
    }

    /// Declares a `GET` method.
    pub fn get(name: impl Into<SmolStr>, path: impl Into<String>) -> Self {
        Self::new(name, Method::GET, path)
    }

    /// Declares a `POST` method.
    pub fn post(name: impl Into<SmolStr>, path: impl Into<String>) -> Self {
        Self::new(name, Method::POST, path)
    }

    /// Declares a `PUT` method.
    pub fn put(name: impl Into<SmolStr>, path: impl Into<String>) -> Self {
        Self::new(name, Method::PUT, path)
    }

    /// Declares a `DELETE` method.
    pub fn delete(name: impl Into<SmolStr>, path: impl Into<String>) -> Self {
        Self::new(name, Method::DELETE, path)
    }

    /// Appends the next positional parameter.
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Adds a static header sent with every request of this method.
    pub fn header(mut self, name: impl Into<SmolStr>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Overrides the declared return kind.
    pub fn returns(mut self, returns: ReturnKind) -> Self {
        self.returns = returns;
        self
    }

    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared return kind.
    pub fn return_kind(&self) -> &ReturnKind {
        &self.returns
    }
}

/// Declarative description of a client interface.
///
/// # Examples
///
/// ```
/// use courier_core::{Interface, MethodSpec, Param};
///
/// let interface = Interface::new("UserService")
///     .method(MethodSpec::get("user", "/users/{id}").param(Param::path("id")))
///     .method(MethodSpec::post("create", "/users").param(Param::body()));
///
/// assert_eq!(interface.methods().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Interface {
    name: SmolStr,
    methods: Vec<MethodSpec>,
}

impl Interface {
    /// Creates an empty interface.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Adds a method declaration.
    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    /// Interface name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared methods in declaration order.
    pub fn methods(&self) -> &[MethodSpec] {
        &self.methods
    }

    /// Finds a method declaration by name.
    pub fn find(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|method| method.name == name)
    }
}

/// Parsed, validated metadata of one method.
#[derive(Debug, Clone)]
pub struct MethodMetadata {
    /// Interface name.
    pub interface: SmolStr,
    /// Method name (dispatch table key).
    pub name: SmolStr,
    /// Declared return kind.
    pub returns: ReturnKind,
    /// Request template bound to the method.
    pub template: Arc<RequestTemplate>,
}

/// Contract collaborator: turns a declaration into per-method metadata.
///
/// Parsing is total: either every method yields metadata or the whole
/// interface is rejected.
pub trait Contract: Send + Sync {
    /// Parses and validates `interface`.
    fn parse(&self, interface: &Interface) -> Result<Vec<MethodMetadata>, BuildError>;
}

/// Default contract.
///
/// Rejects duplicate method names, path placeholders without a matching
/// [`Param::Path`] (and the reverse), more than one body parameter, and
/// static headers that are not valid HTTP headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContract;

impl Contract for DefaultContract {
    fn parse(&self, interface: &Interface) -> Result<Vec<MethodMetadata>, BuildError> {
        let mut seen = HashSet::new();
        interface
            .methods()
            .iter()
            .map(|spec| {
                if !seen.insert(spec.name.clone()) {
                    return Err(BuildError::DuplicateMethod {
                        interface: interface.name.clone(),
                        method: spec.name.clone(),
                    });
                }
                let invalid = |reason: String| BuildError::InvalidMethod {
                    interface: interface.name.clone(),
                    method: spec.name.clone(),
                    reason,
                };

                let placeholders = RequestTemplate::placeholders(&spec.path)
                    .map_err(|reason| invalid(reason.to_owned()))?;
                for placeholder in &placeholders {
                    if !spec
                        .params
                        .iter()
                        .any(|param| matches!(param, Param::Path(name) if name == placeholder))
                    {
                        return Err(invalid(format!("placeholder {{{placeholder}}} has no path param")));
                    }
                }
                for param in &spec.params {
                    if let Param::Path(name) = param
                        && !placeholders.contains(name)
                    {
                        return Err(invalid(format!("path param {name} is not used in {}", spec.path)));
                    }
                }
                if spec.params.iter().filter(|p| matches!(p, Param::Body)).count() > 1 {
                    return Err(invalid("more than one body param".to_owned()));
                }

                let mut headers = Vec::with_capacity(spec.headers.len());
                for (name, value) in &spec.headers {
                    let name = HeaderName::from_bytes(name.as_bytes())
                        .map_err(|err| invalid(format!("header {name}: {err}")))?;
                    let value = HeaderValue::from_str(value)
                        .map_err(|err| invalid(format!("header {name}: {err}")))?;
                    headers.push((name, value));
                }

                Ok(MethodMetadata {
                    interface: interface.name.clone(),
                    name: spec.name.clone(),
                    returns: spec.returns.clone(),
                    template: Arc::new(RequestTemplate::new(
                        spec.name.clone(),
                        spec.method.clone(),
                        spec.path.clone(),
                        spec.params.clone(),
                        headers,
                    )),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_method() {
        let interface = Interface::new("Books")
            .method(MethodSpec::get("book", "/books/{id}").param(Param::path("id")))
            .method(
                MethodSpec::post("create", "/books")
                    .param(Param::body())
                    .header("Accept", "application/json"),
            );

        let metadata = DefaultContract.parse(&interface).unwrap();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[0].name, "book");
        assert_eq!(metadata[1].interface, "Books");
        assert_eq!(metadata[1].template.method(), &Method::POST);
    }

    #[test]
    fn duplicate_method_fails_construction() {
        let interface = Interface::new("Books")
            .method(MethodSpec::get("book", "/a"))
            .method(MethodSpec::get("book", "/b"));

        let err = DefaultContract.parse(&interface).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateMethod { method, .. } if method == "book"));
    }

    #[test]
    fn unbound_placeholder_fails_construction() {
        let interface = Interface::new("Books").method(MethodSpec::get("book", "/books/{id}"));

        let err = DefaultContract.parse(&interface).unwrap_err();
        assert!(matches!(err, BuildError::InvalidMethod { .. }));
    }

    #[test]
    fn unused_path_param_fails_construction() {
        let interface = Interface::new("Books")
            .method(MethodSpec::get("books", "/books").param(Param::path("id")));

        assert!(DefaultContract.parse(&interface).is_err());
    }

    #[test]
    fn two_bodies_fail_construction() {
        let interface = Interface::new("Books").method(
            MethodSpec::post("create", "/books")
                .param(Param::body())
                .param(Param::body()),
        );

        assert!(DefaultContract.parse(&interface).is_err());
    }

    #[test]
    fn value_return_kind_is_kept() {
        let interface = Interface::new("Books").method(
            MethodSpec::get("count", "/count").returns(ReturnKind::Value("u64".into())),
        );

        let metadata = DefaultContract.parse(&interface).unwrap();
        assert_eq!(metadata[0].returns, ReturnKind::Value("u64".into()));
    }
}
