//! Client identity: interface name plus base URL.

use std::fmt;

use http::Uri;
use smol_str::SmolStr;

use crate::error::BuildError;

/// The logical remote endpoint a client handle is bound to.
///
/// A target pairs the declared interface name with the base URL of the
/// service implementing it. It is the sole identity of a client handle:
/// two handles built for equal targets are equal, hash identically and
/// print the same, whatever their dispatch tables contain.
///
/// # Examples
///
/// ```
/// use courier_core::Target;
///
/// let target = Target::new("HelloService", "http://localhost:8091").unwrap();
/// assert_eq!(target.to_string(), "Target(type=HelloService, url=http://localhost:8091)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    name: SmolStr,
    url: Uri,
}

impl Target {
    /// Creates a target, validating that `url` is absolute and has no query.
    pub fn new(name: impl Into<SmolStr>, url: impl AsRef<str>) -> Result<Self, BuildError> {
        let raw = url.as_ref().trim_end_matches('/');
        let url: Uri = raw.parse().map_err(|err: http::uri::InvalidUri| {
            BuildError::InvalidTarget {
                url: raw.to_owned(),
                reason: err.to_string(),
            }
        })?;
        if url.scheme().is_none() || url.authority().is_none() {
            return Err(BuildError::InvalidTarget {
                url: raw.to_owned(),
                reason: "scheme and authority are required".to_owned(),
            });
        }
        if url.query().is_some() {
            return Err(BuildError::InvalidTarget {
                url: raw.to_owned(),
                reason: "query strings belong to method declarations".to_owned(),
            });
        }
        Ok(Self {
            name: name.into(),
            url,
        })
    }

    /// Interface name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base URL.
    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// Base path of the URL without a trailing slash (may be empty).
    pub(crate) fn base_path(&self) -> &str {
        self.url.path().trim_end_matches('/')
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Uri renders "http://host" as "http://host/"; print what was configured.
        let url = self.url.to_string();
        write!(
            f,
            "Target(type={}, url={})",
            self.name,
            url.trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_ignored() {
        let a = Target::new("Hello", "http://localhost:8091/").unwrap();
        let b = Target::new("Hello", "http://localhost:8091").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn name_is_part_of_identity() {
        let a = Target::new("Hello", "http://localhost:8091").unwrap();
        let b = Target::new("Goodbye", "http://localhost:8091").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn relative_url_is_rejected() {
        let err = Target::new("Hello", "/api").unwrap_err();
        assert!(matches!(err, BuildError::InvalidTarget { .. }));
    }

    #[test]
    fn query_on_base_url_is_rejected() {
        let err = Target::new("Hello", "http://localhost:8091/api?key=v").unwrap_err();
        assert!(matches!(
            err,
            BuildError::InvalidTarget { ref url, .. } if url == "http://localhost:8091/api?key=v"
        ));
    }

    #[test]
    fn base_path_keeps_prefix() {
        let target = Target::new("Hello", "http://localhost:8091/api/v1/").unwrap();
        assert_eq!(target.base_path(), "/api/v1");
        assert_eq!(
            target.to_string(),
            "Target(type=Hello, url=http://localhost:8091/api/v1)"
        );
    }
}
