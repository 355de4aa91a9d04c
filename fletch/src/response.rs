//! Evaluated responses and request outcomes.

use crate::request::Request;
use fletch_core::{RawResponse, ResponseBody, SuccessCode};

/// A response classified by the success evaluator.
#[derive(Debug, Clone)]
pub struct EvaluatedResponse {
    /// Whether the status matched the instance's success codes.
    pub success: bool,
    /// HTTP status, or [`fletch_core::SENTINEL_STATUS`].
    pub status_code: u16,
    /// Parsed-or-raw body.
    pub body: ResponseBody,
    /// The request as it was dispatched.
    pub sent: Request,
}

impl EvaluatedResponse {
    /// Evaluate a raw response against success codes.
    pub fn evaluate(raw: RawResponse, sent: Request, success_codes: &[SuccessCode]) -> Self {
        let evaluation = fletch_core::evaluate(raw, success_codes);
        Self {
            success: evaluation.success,
            status_code: evaluation.status_code,
            body: evaluation.body,
            sent,
        }
    }

    /// The failure reported when the final timeout tier fires.
    pub fn timed_out(sent: Request) -> Self {
        Self::evaluate(RawResponse::timed_out(), sent, &[])
    }

    /// The body text, if the body was not JSON.
    pub fn text(&self) -> Option<&str> {
        self.body.as_text()
    }
}

/// The terminal result of sending one request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The request, or a retry of it, succeeded.
    Success(EvaluatedResponse),
    /// The request failed and no retry rescued it.
    Failure(EvaluatedResponse),
}

impl Outcome {
    /// Build an outcome from the response's own success flag.
    pub fn from_response(response: EvaluatedResponse) -> Self {
        if response.success {
            Self::Success(response)
        } else {
            Self::Failure(response)
        }
    }

    /// Whether this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Borrow the response.
    pub fn response(&self) -> &EvaluatedResponse {
        match self {
            Self::Success(response) | Self::Failure(response) => response,
        }
    }

    /// Take the response.
    pub fn into_response(self) -> EvaluatedResponse {
        match self {
            Self::Success(response) | Self::Failure(response) => response,
        }
    }
}

/// The terminal result of sending a batch.
///
/// Responses that went through a retry action are appended after the ones
/// that did not, in the order their retries settled. The batch order is
/// therefore only preserved when nothing was retried.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// Every member succeeded.
    Success(Vec<EvaluatedResponse>),
    /// At least one member failed. Successful members are included.
    Failure(Vec<EvaluatedResponse>),
}

impl BatchOutcome {
    /// Whether every member succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Borrow the responses.
    pub fn responses(&self) -> &[EvaluatedResponse] {
        match self {
            Self::Success(responses) | Self::Failure(responses) => responses,
        }
    }

    /// Take the responses.
    pub fn into_responses(self) -> Vec<EvaluatedResponse> {
        match self {
            Self::Success(responses) | Self::Failure(responses) => responses,
        }
    }
}
