//! Request templates: binding call arguments into an HTTP request.

use bytes::Bytes;
use http::header::HeaderMap;
use http::{HeaderName, HeaderValue, Method, Request, Uri};
use serde_json::Value;
use smol_str::SmolStr;

use crate::codec::Encoder;
use crate::contract::Param;
use crate::error::{Error, ResolutionError};
use crate::target::Target;

/// Positional call arguments, one per declared [`Param`].
pub type Arguments = Vec<Value>;

/// Request template produced by the contract for a single method.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    name: SmolStr,
    method: Method,
    path: String,
    params: Vec<Param>,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl RequestTemplate {
    pub(crate) fn new(
        name: SmolStr,
        method: Method,
        path: String,
        params: Vec<Param>,
        headers: Vec<(HeaderName, HeaderValue)>,
    ) -> Self {
        Self {
            name,
            method,
            path,
            params,
            headers,
        }
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path template, e.g. `/users/{id}`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared parameters.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Names of the `{placeholders}` in a path template, in order.
    pub(crate) fn placeholders(path: &str) -> Result<Vec<SmolStr>, &'static str> {
        let mut names = Vec::new();
        let mut rest = path;
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or("unterminated placeholder")?;
            let name = &after[..end];
            if name.is_empty() || name.contains('{') {
                return Err("malformed placeholder");
            }
            names.push(SmolStr::new(name));
            rest = &after[end + 1..];
        }
        if rest.contains('}') {
            return Err("unbalanced '}' in path");
        }
        Ok(names)
    }

    /// Binds `args` into a request against `target`.
    ///
    /// Path arguments are percent-encoded as a single segment, query
    /// arguments are form-encoded (arrays repeat the key, `null` is skipped),
    /// header arguments are sent verbatim and the body argument goes
    /// through `encoder`.
    pub fn resolve(
        &self,
        target: &Target,
        args: &[Value],
        encoder: &dyn Encoder,
    ) -> Result<Request<Bytes>, Error> {
        if args.len() != self.params.len() {
            return Err(ResolutionError::ArgumentCount {
                method: self.name.clone(),
                expected: self.params.len(),
                actual: args.len(),
            }
            .into());
        }

        let mut path = self.path.clone();
        let mut query: Vec<(&str, String)> = Vec::new();
        let mut headers = HeaderMap::new();
        let mut body = Bytes::new();

        for (name, value) in &self.headers {
            headers.append(name.clone(), value.clone());
        }

        for (param, value) in self.params.iter().zip(args) {
            match param {
                Param::Path(name) => {
                    let rendered = scalar(name, value)?.ok_or_else(|| {
                        ResolutionError::UnboundPlaceholder(name.clone())
                    })?;
                    path = path.replace(&format!("{{{name}}}"), &encode_segment(&rendered));
                }
                Param::Query(name) => match value {
                    Value::Array(items) => {
                        for item in items {
                            if let Some(rendered) = scalar(name, item)? {
                                query.push((name.as_str(), rendered));
                            }
                        }
                    }
                    other => {
                        if let Some(rendered) = scalar(name, other)? {
                            query.push((name.as_str(), rendered));
                        }
                    }
                },
                Param::Header(name) => {
                    if let Some(rendered) = scalar(name, value)? {
                        let header_name = HeaderName::from_bytes(name.as_bytes())
                            .map_err(|err| invalid(name, err.to_string()))?;
                        let header_value = HeaderValue::from_str(&rendered)
                            .map_err(|err| invalid(name, err.to_string()))?;
                        headers.insert(header_name, header_value);
                    }
                }
                Param::Body => {
                    body = encoder.encode(value, &mut headers)?;
                }
            }
        }

        let mut path_and_query = format!("{}{}", target.base_path(), path);
        if path_and_query.is_empty() {
            path_and_query.push('/');
        }
        if !query.is_empty() {
            let encoded = serde_urlencoded::to_string(&query)
                .map_err(|err| invalid(&self.name, err.to_string()))?;
            path_and_query.push('?');
            path_and_query.push_str(&encoded);
        }

        let url = target.url();
        let mut uri = Uri::builder().path_and_query(path_and_query.as_str());
        if let Some(scheme) = url.scheme_str() {
            uri = uri.scheme(scheme);
        }
        if let Some(authority) = url.authority() {
            uri = uri.authority(authority.as_str());
        }
        let uri = uri.build().map_err(ResolutionError::InvalidUri)?;

        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(uri)
            .body(body)
            .map_err(ResolutionError::InvalidUri)?;
        *request.headers_mut() = headers;
        Ok(request)
    }
}

fn invalid(name: &SmolStr, reason: String) -> ResolutionError {
    ResolutionError::InvalidArgument {
        name: name.clone(),
        reason,
    }
}

/// Renders a scalar JSON value; `null` renders to `None`.
fn scalar(name: &SmolStr, value: &Value) -> Result<Option<String>, ResolutionError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Array(_) | Value::Object(_) => {
            Err(invalid(name, "only scalar values can be bound here".to_owned()))
        }
    }
}

/// Percent-encodes a single path segment.
fn encode_segment(segment: &str) -> String {
    // Form encoding escapes everything a path segment needs escaped, but
    // renders spaces as '+', which is literal in a path.
    serde_urlencoded::to_string([("", segment)])
        .map(|encoded| encoded.trim_start_matches('=').replace('+', "%20"))
        .unwrap_or_else(|_| segment.to_owned())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::codec::Encoder;
    use crate::error::EncodeError;

    struct RawEncoder;

    impl Encoder for RawEncoder {
        fn encode(&self, body: &Value, headers: &mut HeaderMap) -> Result<Bytes, EncodeError> {
            headers.insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain"),
            );
            Ok(Bytes::from(body.to_string()))
        }
    }

    fn template(path: &str, params: Vec<Param>) -> RequestTemplate {
        RequestTemplate::new("test".into(), Method::GET, path.to_owned(), params, Vec::new())
    }

    fn target() -> Target {
        Target::new("Test", "http://localhost:8080/api").unwrap()
    }

    #[test]
    fn placeholders_are_listed_in_order() {
        let names = RequestTemplate::placeholders("/a/{x}/b/{y}").unwrap();
        assert_eq!(names, vec![SmolStr::new("x"), SmolStr::new("y")]);
        assert!(RequestTemplate::placeholders("/a/{x").is_err());
        assert!(RequestTemplate::placeholders("/a/x}").is_err());
        assert!(RequestTemplate::placeholders("/a/{}").is_err());
    }

    #[test]
    fn path_and_query_are_bound() {
        let template = template(
            "/users/{id}",
            vec![Param::path("id"), Param::query("tag"), Param::query("page")],
        );
        let request = template
            .resolve(
                &target(),
                &[json!("a b/c"), json!(["x", "y"]), json!(2)],
                &RawEncoder,
            )
            .unwrap();

        assert_eq!(
            request.uri().to_string(),
            "http://localhost:8080/api/users/a%20b%2Fc?tag=x&tag=y&page=2"
        );
        assert!(request.body().is_empty());
    }

    #[test]
    fn null_query_is_skipped() {
        let template = template("/users", vec![Param::query("tag")]);
        let request = template.resolve(&target(), &[Value::Null], &RawEncoder).unwrap();
        assert_eq!(request.uri().path_and_query().unwrap().as_str(), "/api/users");
    }

    #[test]
    fn null_path_argument_is_a_binding_error() {
        let template = template("/users/{id}", vec![Param::path("id")]);
        let err = template.resolve(&target(), &[Value::Null], &RawEncoder).unwrap_err();
        assert!(matches!(
            err,
            Error::HandlerResolution(ResolutionError::UnboundPlaceholder(_))
        ));
    }

    #[test]
    fn argument_count_is_checked() {
        let template = template("/users/{id}", vec![Param::path("id")]);
        let err = template.resolve(&target(), &[], &RawEncoder).unwrap_err();
        assert!(matches!(
            err,
            Error::HandlerResolution(ResolutionError::ArgumentCount {
                expected: 1,
                actual: 0,
                ..
            })
        ));
    }

    #[test]
    fn object_in_query_is_rejected() {
        let template = template("/users", vec![Param::query("filter")]);
        let err = template
            .resolve(&target(), &[json!({"a": 1})], &RawEncoder)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::HandlerResolution(ResolutionError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn header_and_body_are_bound() {
        let template = template("/users", vec![Param::header("x-token"), Param::body()]);
        let request = template
            .resolve(&target(), &[json!("secret"), json!({"name": "ann"})], &RawEncoder)
            .unwrap();

        assert_eq!(request.headers()["x-token"], "secret");
        assert_eq!(request.headers()["content-type"], "text/plain");
        assert_eq!(request.body().as_ref(), br#"{"name":"ann"}"#);
    }

    #[test]
    fn root_path_without_base() {
        let target = Target::new("Test", "http://localhost:8080").unwrap();
        let template = template("", Vec::new());
        let request = template.resolve(&target, &[], &RawEncoder).unwrap();
        assert_eq!(request.uri().to_string(), "http://localhost:8080/");
    }
}
