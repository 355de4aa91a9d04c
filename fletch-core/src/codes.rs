//! Status-code specifiers and matching.
//!
//! A [`SuccessCode`] is either an exact number (`204`), a numeric string
//! (`"204"`) or an inclusive range string (`"200-299"`). Malformed
//! specifiers never raise; they simply fail to match.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the bounds of a range specifier.
const RANGE_SEPARATOR: char = '-';

/// A specifier classifying HTTP status codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SuccessCode {
    /// Matches exactly this number.
    Exact(i64),
    /// A numeric string or an inclusive `"low-high"` range.
    Pattern(String),
}

impl SuccessCode {
    /// Create an inclusive range specifier.
    pub fn range(low: u16, high: u16) -> Self {
        Self::Pattern(format!("{low}{RANGE_SEPARATOR}{high}"))
    }

    /// Build a specifier from an arbitrary JSON value.
    ///
    /// Numbers and strings are accepted. A float counts as a number only
    /// when it has no fractional part, so `200.0` is `Exact(200)`. Every
    /// other kind of value yields `None` and therefore never matches.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral))
                .map(Self::Exact),
            serde_json::Value::String(s) => Some(Self::Pattern(s.clone())),
            _ => None,
        }
    }

    /// Build specifiers from a list of arbitrary JSON values, dropping the
    /// values [`from_value`](Self::from_value) rejects.
    pub fn from_values(values: &[serde_json::Value]) -> Vec<Self> {
        values.iter().filter_map(Self::from_value).collect()
    }

    /// Check whether `code` satisfies this specifier.
    pub fn matches(&self, code: u16) -> bool {
        matches(code, self)
    }
}

impl fmt::Display for SuccessCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::Pattern(p) => f.write_str(p),
        }
    }
}

impl From<u16> for SuccessCode {
    fn from(code: u16) -> Self {
        Self::Exact(i64::from(code))
    }
}

impl From<i64> for SuccessCode {
    fn from(code: i64) -> Self {
        Self::Exact(code)
    }
}

impl From<&str> for SuccessCode {
    fn from(pattern: &str) -> Self {
        Self::Pattern(pattern.to_string())
    }
}

impl From<String> for SuccessCode {
    fn from(pattern: String) -> Self {
        Self::Pattern(pattern)
    }
}

fn integral(n: f64) -> Option<i64> {
    let in_range = n >= i64::MIN as f64 && n < i64::MAX as f64;
    (n.fract() == 0.0 && in_range).then_some(n as i64)
}

/// Test a status code against a single specifier.
pub fn matches(code: u16, specifier: &SuccessCode) -> bool {
    match specifier {
        SuccessCode::Exact(n) => i64::from(code) == *n,
        SuccessCode::Pattern(pattern) => matches_pattern(code, pattern),
    }
}

/// Test a status code against a list of specifiers, stopping at the first match.
pub fn any_matches(code: u16, specifiers: &[SuccessCode]) -> bool {
    specifiers.iter().any(|specifier| matches(code, specifier))
}

fn matches_pattern(code: u16, pattern: &str) -> bool {
    let segments: Vec<&str> = pattern.split(RANGE_SEPARATOR).collect();
    if segments.len() != 2 {
        return code.to_string() == pattern;
    }

    let (low, high) = (segments[0], segments[1]);
    // A bound must be a bare integer: "200-299,302" is not a range ending at 299302.
    if low.contains(',') || high.contains(',') {
        return false;
    }

    match (parse_bound(low), parse_bound(high)) {
        (Some(low), Some(high)) => {
            let code = i64::from(code);
            low <= code && code <= high
        }
        _ => false,
    }
}

fn parse_bound(segment: &str) -> Option<i64> {
    segment.trim().parse().ok()
}
