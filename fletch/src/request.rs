//! Request descriptors.

use crate::action::RetryRule;
use crate::cache::CachePolicy;
use fletch_core::HeaderSet;

/// Everything needed to dispatch one request.
///
/// A descriptor is built by the caller, then rewritten once by the
/// orchestrator before dispatch: the instance base path is prefixed and the
/// instance headers are merged in. Local retry rules are one-time: a rule
/// that fires is removed from the descriptor.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Target path, or a full URL once the base path is applied.
    pub path: String,
    /// HTTP method. Empty means GET.
    pub method: String,
    /// Optional body text.
    pub body: Option<String>,
    /// Request headers.
    pub headers: HeaderSet,
    /// Instance to resolve configuration from. `None` means the default.
    pub instance_name: Option<String>,
    /// One-time retry rules that take precedence over the instance's rules.
    pub retry_rules: Vec<RetryRule>,
    /// Optional response caching.
    pub cache: Option<CachePolicy>,
}

impl Request {
    /// Create a request for a path with no method set.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(path).method("GET")
    }

    /// Create a POST request with a body.
    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(path).method("POST").body(body)
    }

    /// Set the method.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Set the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the instance name.
    #[must_use]
    pub fn instance(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// Attach a one-time retry rule.
    #[must_use]
    pub fn retry_rule(mut self, rule: RetryRule) -> Self {
        self.retry_rules.push(rule);
        self
    }

    /// Attach a caching policy.
    #[must_use]
    pub fn cache(mut self, policy: CachePolicy) -> Self {
        self.cache = Some(policy);
        self
    }

    /// The method to put on the wire.
    pub fn effective_method(&self) -> &str {
        if self.method.is_empty() {
            "GET"
        } else {
            &self.method
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let request = Request::post("/users", "{}")
            .header("Content-Type", "application/json")
            .instance("api");

        assert_eq!(request.path, "/users");
        assert_eq!(request.effective_method(), "POST");
        assert_eq!(request.body.as_deref(), Some("{}"));
        assert_eq!(request.headers.get("content-type"), Some("application/json"));
        assert_eq!(request.instance_name.as_deref(), Some("api"));
        assert!(request.retry_rules.is_empty());
    }

    #[test]
    fn test_empty_method_defaults_to_get() {
        assert_eq!(Request::new("/").effective_method(), "GET");
    }
}
