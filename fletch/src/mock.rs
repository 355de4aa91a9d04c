//! Scripted transport for testing.
//!
//! [`MockTransport`] answers each dispatch from a per-path script and
//! records every request it sees. The last reply scripted for a path is
//! sticky; paths with no script get the default reply.
//!
//! ```rust
//! use fletch::mock::{MockReply, MockTransport};
//!
//! let transport = MockTransport::new()
//!     .with_reply("/users", MockReply::respond(504, "busy"))
//!     .with_reply("/users", MockReply::respond(200, "[]"));
//! ```

use crate::request::Request;
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use fletch_core::RawResponse;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Respond with a status and body.
    Respond {
        /// Status code.
        status: u16,
        /// Body text.
        body: String,
    },
    /// Fail without a status.
    Fail(String),
    /// Report an abort immediately.
    Abort,
    /// Never respond; resolves as aborted once cancelled.
    Hang,
    /// Wait, then reply. Cancellation during the wait aborts.
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    /// A response with a status and body.
    pub fn respond(status: u16, body: impl Into<String>) -> Self {
        Self::Respond {
            status,
            body: body.into(),
        }
    }

    /// A failure without a status.
    pub fn fail(detail: impl Into<String>) -> Self {
        Self::Fail(detail.into())
    }

    /// Delay this reply.
    pub fn after(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

impl Default for MockReply {
    fn default() -> Self {
        Self::respond(200, "")
    }
}

#[derive(Debug, Default)]
struct Script {
    replies: HashMap<String, VecDeque<MockReply>>,
    default: MockReply,
}

impl Script {
    fn next(&mut self, path: &str) -> MockReply {
        match self.replies.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => self.default.clone(),
        }
    }
}

/// A transport that replays scripted replies.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl MockTransport {
    /// Create a transport answering 200 with an empty body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for a path.
    pub fn with_reply(self, path: impl Into<String>, reply: MockReply) -> Self {
        self.push_reply(path, reply);
        self
    }

    /// Set the reply for unscripted paths.
    pub fn with_default(self, reply: MockReply) -> Self {
        self.set_default(reply);
        self
    }

    /// Queue a reply for a path.
    pub fn push_reply(&self, path: impl Into<String>, reply: MockReply) {
        self.script
            .lock()
            .replies
            .entry(path.into())
            .or_default()
            .push_back(reply);
    }

    /// Set the reply for unscripted paths.
    pub fn set_default(&self, reply: MockReply) {
        self.script.lock().default = reply;
    }

    /// Get recorded requests.
    pub fn recorded_requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    /// Number of dispatches for a path.
    pub fn calls_to(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.path == path).count()
    }

    /// Number of dispatches.
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Clear recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }
}

async fn play(reply: MockReply, cancel: &CancellationToken) -> Result<RawResponse, TransportError> {
    let mut reply = reply;
    loop {
        if cancel.is_cancelled() {
            return Err(TransportError::Aborted);
        }
        match reply {
            MockReply::Respond { status, body } => return Ok(RawResponse::new(status, body)),
            MockReply::Fail(detail) => return Err(TransportError::Other(detail)),
            MockReply::Abort => return Err(TransportError::Aborted),
            MockReply::Hang => {
                cancel.cancelled().await;
                return Err(TransportError::Aborted);
            }
            MockReply::Delayed(delay, next) => {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(TransportError::Aborted),
                    _ = tokio::time::sleep(delay) => reply = *next,
                }
            }
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn attempt(
        &self,
        request: &Request,
        cancel: CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        self.requests.lock().push(request.clone());
        let reply = self.script.lock().next(&request.path);
        play(reply, &cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let transport = MockTransport::new()
            .with_reply("/a", MockReply::respond(504, "busy"))
            .with_reply("/a", MockReply::respond(200, "ok"));
        let request = Request::get("/a");

        let first = assert_ok!(transport.attempt(&request, CancellationToken::new()).await);
        let second = assert_ok!(transport.attempt(&request, CancellationToken::new()).await);
        let third = assert_ok!(transport.attempt(&request, CancellationToken::new()).await);

        assert_eq!(first, RawResponse::new(504, "busy"));
        assert_eq!(second, RawResponse::new(200, "ok"));
        assert_eq!(third, RawResponse::new(200, "ok"));
        assert_eq!(transport.calls_to("/a"), 3);
    }

    #[tokio::test]
    async fn test_default_reply() {
        let transport = MockTransport::new().with_default(MockReply::respond(404, "missing"));
        let raw = assert_ok!(transport.attempt(&Request::get("/x"), CancellationToken::new()).await);
        assert_eq!(raw.status_code, 404);
    }

    #[tokio::test]
    async fn test_fail() {
        let transport = MockTransport::new().with_default(MockReply::fail("boom"));
        let err = assert_err!(transport.attempt(&Request::get("/x"), CancellationToken::new()).await);
        assert!(matches!(err, TransportError::Other(detail) if detail == "boom"));
    }

    #[tokio::test]
    async fn test_hang_until_cancelled() {
        let transport = MockTransport::new().with_default(MockReply::Hang);
        let cancel = CancellationToken::new();

        let pending = {
            let transport = transport.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { transport.attempt(&Request::get("/x"), cancel).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(TransportError::Aborted)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_reply() {
        let transport = MockTransport::new()
            .with_default(MockReply::respond(200, "late").after(Duration::from_millis(50)));
        let started = tokio::time::Instant::now();

        let raw = assert_ok!(transport.attempt(&Request::get("/x"), CancellationToken::new()).await);

        assert_eq!(raw.body, "late");
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let transport = MockTransport::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = transport.attempt(&Request::get("/x"), cancel).await;
        assert!(matches!(result, Err(TransportError::Aborted)));
        assert_eq!(transport.call_count(), 1);
    }
}
