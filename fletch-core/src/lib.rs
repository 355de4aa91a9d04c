//! # fletch-core
//!
//! Leaf building blocks for the fletch request orchestrator.
//!
//! - **Codes**: success-code specifiers (`204`, `"204"`, `"200-299"`)
//! - **Headers**: insertion-ordered header sets and the local/global merge
//! - **Responses**: raw transport output, body parsing, success evaluation
//! - **Identifiers**: instance names and cache keys
//!
//! ## Example
//!
//! ```rust
//! use fletch_core::{evaluate, RawResponse, SuccessCode};
//!
//! let codes = vec![SuccessCode::from("200-299"), SuccessCode::from(304u16)];
//! let evaluation = evaluate(RawResponse::new(304, r#"{"cached": true}"#), &codes);
//!
//! assert!(evaluation.success);
//! assert!(evaluation.body.as_json().is_some());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codes;
pub mod errors;
pub mod headers;
pub mod identifier;
pub mod response;

// Re-exports for convenience
pub use codes::{any_matches, matches, SuccessCode};
pub use errors::{CoreError, Result};
pub use headers::{combine, HeaderSet};
pub use identifier::{
    cache_key, resolve_instance_name, validate_instance_name, DEFAULT_INSTANCE, KEY_SEPARATOR,
};
pub use response::{
    evaluate, Evaluation, RawResponse, ResponseBody, ABORTED_MESSAGE, SENTINEL_STATUS,
    TIMED_OUT_MESSAGE, UNKNOWN_ERROR_PREFIX,
};
