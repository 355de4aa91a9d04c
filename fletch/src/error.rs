//! Error types for fletch.
//!
//! Failed requests are not errors: transport failures, aborts, timeouts and
//! unmatched status codes all settle as [`Outcome::Failure`]. The errors
//! here cover misuse and misconfiguration, which are reported before any
//! request is dispatched.
//!
//! [`Outcome::Failure`]: crate::Outcome::Failure

use crate::store::StoreError;
use fletch_core::CoreError;
use thiserror::Error;

/// The main error type for fletch operations.
#[derive(Error, Debug)]
pub enum FletchError {
    /// Invalid instance configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An entry point was called with the wrong arity.
    #[error("Usage error: {0}")]
    Usage(String),

    /// The configuration store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FletchError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a usage error.
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }
}

impl From<CoreError> for FletchError {
    fn from(err: CoreError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Result type alias using FletchError.
pub type Result<T> = std::result::Result<T, FletchError>;
