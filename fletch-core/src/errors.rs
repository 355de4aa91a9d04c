//! Error types for fletch-core.

use thiserror::Error;

/// Errors raised by the core building blocks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An instance name that cannot be used as a registry or cache key.
    #[error("Invalid instance name '{name}': {reason}")]
    InvalidInstanceName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl CoreError {
    /// Create an invalid instance name error.
    pub fn invalid_instance_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInstanceName {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::invalid_instance_name("a-b", "contains '-'");
        assert_eq!(err.to_string(), "Invalid instance name 'a-b': contains '-'");
    }
}
