//! # fletch
//!
//! Configurable HTTP request orchestration.
//!
//! Requests are sent against named instances. An instance decides which
//! status codes count as success, which retry rules react to failures, how
//! long each attempt may run and how many times a stalled attempt is
//! aborted and re-sent before the request times out.
//!
//! ## Core Concepts
//!
//! - **[`Fletch`]**: The client; sends single requests and batches
//! - **[`Instance`]**: A named, shared configuration
//! - **[`RetryRule`]**: A status code bound to a [`RetryAction`]
//! - **[`TimeoutRace`]**: The tiered timeout ladder around each attempt
//! - **[`Transport`]**: Performs one HTTP exchange
//!
//! ## Timeouts
//!
//! With a per-tier timeout `T` and `N` retry tiers, a stalled attempt is
//! aborted and re-sent at `T, 2T … NT`, and the request fails with status
//! `0` and body `"Request Timed Out"` at `(N+1)T`. A zero timeout disables
//! the ladder.
//!
//! ## Retry Rules
//!
//! Instance rules are shared by every request. While one resends a request
//! it is suppressed for that request's path, and restored once the retry
//! settles. Rules attached to a request are one-time and take precedence.
//!
//! ## Example
//!
//! ```ignore
//! use fletch::prelude::*;
//! use std::time::Duration;
//!
//! let fletch = Fletch::http();
//! fletch.configure(
//!     InstanceOptions::named("api")
//!         .base_path("https://api.example.com")
//!         .timeout(Duration::from_secs(5)),
//! )?;
//!
//! let outcome = fletch
//!     .send_single(Request::get("/users").instance("api"), None)
//!     .await?;
//!
//! match outcome {
//!     Outcome::Success(response) => println!("{:?}", response.body),
//!     Outcome::Failure(response) => eprintln!("failed: {}", response.status_code),
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod action;
mod batch;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod mock;
pub mod race;
pub mod registry;
pub mod request;
pub mod response;
pub mod store;
pub mod transport;

// Re-exports
pub use action::{ActionFn, Resend, Resolution, RetryAction, RetryContext, RetryRule, Suppression};
pub use cache::{CachePolicy, CachedResponse, InMemoryCache, ResponseCache};
pub use client::{Dispatched, Fletch, FletchBuilder, Outgoing, WaitingToggle};
pub use config::{AbortSwitch, Instance, InstanceConfig, InstanceOptions};
pub use error::{FletchError, Result};
pub use race::{RaceResult, RaceState, Tier, TimeoutRace, TimerLadder};
pub use registry::Registry;
pub use request::Request;
pub use response::{BatchOutcome, EvaluatedResponse, Outcome};
pub use store::{ConfigStore, InMemoryStore, StoreError};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{Transport, TransportError};

pub use fletch_core::{HeaderSet, RawResponse, ResponseBody, SuccessCode};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        BatchOutcome, EvaluatedResponse, Fletch, FletchError, HeaderSet, InstanceOptions,
        Outcome, Request, RetryRule, SuccessCode, WaitingToggle,
    };
}
