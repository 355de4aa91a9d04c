//! Instance names and derived keys.

use crate::errors::{CoreError, Result};

/// Name of the instance used when a request does not name one.
pub const DEFAULT_INSTANCE: &str = "fletch";

/// Separator joining the parts of a cache key.
pub const KEY_SEPARATOR: char = '-';

/// Resolve an optional instance name, falling back to [`DEFAULT_INSTANCE`].
///
/// An empty name is treated as absent.
pub fn resolve_instance_name(name: Option<&str>) -> &str {
    match name {
        Some(name) if !name.is_empty() => name,
        _ => DEFAULT_INSTANCE,
    }
}

/// Check that a name can be used to key instances and cached responses.
pub fn validate_instance_name(name: &str) -> Result<()> {
    if name.contains(KEY_SEPARATOR) {
        return Err(CoreError::invalid_instance_name(
            name,
            format!("must not contain '{KEY_SEPARATOR}'"),
        ));
    }
    Ok(())
}

/// Build the cache key for a response: `instance-path-expiration`.
pub fn cache_key(instance: &str, path: &str, expires_at_millis: i64) -> String {
    format!("{instance}{KEY_SEPARATOR}{path}{KEY_SEPARATOR}{expires_at_millis}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_instance_name() {
        assert_eq!(resolve_instance_name(None), DEFAULT_INSTANCE);
        assert_eq!(resolve_instance_name(Some("")), DEFAULT_INSTANCE);
        assert_eq!(resolve_instance_name(Some("billing")), "billing");
    }

    #[test]
    fn test_validate_instance_name() {
        assert!(validate_instance_name(DEFAULT_INSTANCE).is_ok());
        assert!(validate_instance_name("billing_v2").is_ok());
        assert!(matches!(
            validate_instance_name("billing-v2"),
            Err(CoreError::InvalidInstanceName { .. })
        ));
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("api", "/users", 1700000000000), "api-/users-1700000000000");
    }
}
