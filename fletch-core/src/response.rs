//! Raw responses, body parsing and success evaluation.

use crate::codes::{any_matches, SuccessCode};
use serde::{Deserialize, Serialize};

/// Status code reported for outcomes that never produced an HTTP status:
/// transport errors, aborts and timeouts.
pub const SENTINEL_STATUS: u16 = 0;

/// Body text reported when an attempt is aborted.
pub const ABORTED_MESSAGE: &str = "Request Aborted";

/// Body text reported when the final timeout tier fires.
pub const TIMED_OUT_MESSAGE: &str = "Request Timed Out";

/// Prefix of the body text reported for unrecognised transport failures.
pub const UNKNOWN_ERROR_PREFIX: &str = "Unknown Error: ";

/// A status code and body text, as produced by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    /// HTTP status code, or [`SENTINEL_STATUS`].
    pub status_code: u16,
    /// Body as text.
    pub body: String,
}

impl RawResponse {
    /// Create a raw response.
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }

    /// The response reported for an aborted attempt.
    pub fn aborted() -> Self {
        Self::new(SENTINEL_STATUS, ABORTED_MESSAGE)
    }

    /// The response reported for an unrecognised transport failure.
    pub fn unknown_error(detail: impl std::fmt::Display) -> Self {
        Self::new(SENTINEL_STATUS, format!("{UNKNOWN_ERROR_PREFIX}{detail}"))
    }

    /// The response reported when the final timeout tier fires.
    pub fn timed_out() -> Self {
        Self::new(SENTINEL_STATUS, TIMED_OUT_MESSAGE)
    }
}

/// A response body, parsed as JSON when possible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// The body parsed as JSON.
    Json(serde_json::Value),
    /// The raw text, kept when it is not valid JSON.
    Text(String),
}

impl ResponseBody {
    /// Parse body text, retaining it unchanged if it is not JSON.
    pub fn parse(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text),
        }
    }

    /// Get the text if the body was not JSON.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }

    /// Get the JSON value if the body parsed.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }
}

/// The verdict of the success evaluator for one raw response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Whether the status matched any success specifier.
    pub success: bool,
    /// The status code.
    pub status_code: u16,
    /// The parsed-or-raw body.
    pub body: ResponseBody,
}

/// Classify a raw response against a list of success specifiers.
pub fn evaluate(raw: RawResponse, success_codes: &[SuccessCode]) -> Evaluation {
    Evaluation {
        success: any_matches(raw.status_code, success_codes),
        status_code: raw.status_code,
        body: ResponseBody::parse(raw.body),
    }
}
