//! Transports dispatch a single prepared request.
//!
//! A transport resolves to a [`RawResponse`] for every HTTP status,
//! including 4xx and 5xx. Only failures that produced no status are
//! reported as [`TransportError`].

use crate::request::Request;
use async_trait::async_trait;
use fletch_core::RawResponse;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A dispatch failure that produced no HTTP status.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The attempt was cancelled through its abort signal.
    #[error("request aborted")]
    Aborted,

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create an `Other` error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// The raw response an attempt reports for this failure.
    pub fn into_raw(self) -> RawResponse {
        match self {
            Self::Aborted => RawResponse::aborted(),
            Self::Other(detail) => RawResponse::unknown_error(detail),
        }
    }
}

/// Performs one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dispatch `request`, stopping early when `cancel` fires.
    async fn attempt(
        &self,
        request: &Request,
        cancel: CancellationToken,
    ) -> Result<RawResponse, TransportError>;
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::{Transport, TransportError};
    use crate::request::Request;
    use async_trait::async_trait;
    use fletch_core::RawResponse;
    use reqwest::{Client, Method};
    use tokio_util::sync::CancellationToken;
    use tracing::debug;

    impl From<reqwest::Error> for TransportError {
        fn from(err: reqwest::Error) -> Self {
            TransportError::Other(err.to_string())
        }
    }

    /// Transport backed by `reqwest`.
    #[derive(Debug, Clone, Default)]
    pub struct HttpTransport {
        client: Client,
    }

    impl HttpTransport {
        /// Create a transport with a default client.
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a transport with a custom client.
        pub fn with_client(client: Client) -> Self {
            Self { client }
        }

        /// Get a reference to the underlying client.
        pub fn client(&self) -> &Client {
            &self.client
        }

        async fn exchange(&self, request: &Request) -> Result<RawResponse, TransportError> {
            let method = Method::from_bytes(request.effective_method().to_uppercase().as_bytes())
                .map_err(|e| TransportError::other(e.to_string()))?;

            debug!(method = %method, url = %request.path, "Making HTTP request");

            let mut builder = self.client.request(method, &request.path);
            for (name, value) in request.headers.iter() {
                builder = builder.header(name, value);
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let response = builder.send().await?;
            let status_code = response.status().as_u16();
            let body = response.text().await?;
            Ok(RawResponse::new(status_code, body))
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn attempt(
            &self,
            request: &Request,
            cancel: CancellationToken,
        ) -> Result<RawResponse, TransportError> {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => Err(TransportError::Aborted),
                result = self.exchange(request) => result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fletch_core::{ABORTED_MESSAGE, SENTINEL_STATUS};

    #[test]
    fn test_aborted_into_raw() {
        let raw = TransportError::Aborted.into_raw();
        assert_eq!(raw.status_code, SENTINEL_STATUS);
        assert_eq!(raw.body, ABORTED_MESSAGE);
    }

    #[test]
    fn test_other_into_raw() {
        let raw = TransportError::other("connection refused").into_raw();
        assert_eq!(raw.status_code, SENTINEL_STATUS);
        assert_eq!(raw.body, "Unknown Error: connection refused");
    }

    #[test]
    fn test_display() {
        assert_eq!(TransportError::Aborted.to_string(), "request aborted");
        assert_eq!(TransportError::other("boom").to_string(), "boom");
    }
}
