//! The request client and single-request orchestration.
//!
//! A [`Fletch`] owns the instance registry, a [`Transport`] and an optional
//! [`ResponseCache`]. Sending a request resolves its instance, rewrites the
//! request against the instance (base path, merged headers), then races
//! dispatch attempts against the instance's timeout ladder. A failed
//! attempt is handed to the selected retry rule, whose outcome settles the
//! request.

use crate::action::{self, RetryContext, RetryRule, Suppression};
use crate::cache::{self, ResponseCache};
use crate::config::{Instance, InstanceOptions};
use crate::error::{FletchError, Result};
use crate::race::{RaceResult, TimeoutRace};
use crate::registry::Registry;
use crate::request::Request;
use crate::response::{BatchOutcome, EvaluatedResponse, Outcome};
use crate::transport::Transport;
use fletch_core::combine;
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback told when a request starts (`true`) or stops (`false`) waiting
/// on the network.
pub type WaitingToggle = Arc<dyn Fn(bool) + Send + Sync>;

/// What to send: one request or a batch.
#[derive(Debug, Clone)]
pub enum Outgoing {
    /// A single request.
    Single(Request),
    /// A batch sharing one timeout ladder.
    Batch(Vec<Request>),
}

impl From<Request> for Outgoing {
    fn from(request: Request) -> Self {
        Self::Single(request)
    }
}

impl From<Vec<Request>> for Outgoing {
    fn from(requests: Vec<Request>) -> Self {
        Self::Batch(requests)
    }
}

impl<const N: usize> From<[Request; N]> for Outgoing {
    fn from(requests: [Request; N]) -> Self {
        Self::Batch(requests.into())
    }
}

/// Result of [`Fletch::send`], matching the shape of what was sent.
#[derive(Debug, Clone)]
pub enum Dispatched {
    /// Outcome of a single request.
    Single(Outcome),
    /// Outcome of a batch.
    Batch(BatchOutcome),
}

impl Dispatched {
    /// Whether the request, or every batch member, succeeded.
    pub fn is_success(&self) -> bool {
        match self {
            Self::Single(outcome) => outcome.is_success(),
            Self::Batch(outcome) => outcome.is_success(),
        }
    }
}

struct Inner {
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn ResponseCache>>,
}

/// Request orchestrator.
///
/// Cloning is cheap; clones share the registry, transport and cache.
#[derive(Clone)]
pub struct Fletch {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Fletch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fletch")
            .field("registry", &self.inner.registry)
            .field("cached", &self.inner.cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Fletch`].
pub struct FletchBuilder {
    registry: Option<Arc<Registry>>,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn ResponseCache>>,
}

impl FletchBuilder {
    /// Start from a transport.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            registry: None,
            transport: Arc::new(transport),
            cache: None,
        }
    }

    /// Use a shared registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Enable response caching.
    #[must_use]
    pub fn cache(mut self, cache: impl ResponseCache + 'static) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Build the client.
    pub fn build(self) -> Fletch {
        Fletch {
            inner: Arc::new(Inner {
                registry: self.registry.unwrap_or_default(),
                transport: self.transport,
                cache: self.cache,
            }),
        }
    }
}

impl Fletch {
    /// Create a client over a transport with a fresh registry.
    pub fn new(transport: impl Transport + 'static) -> Self {
        FletchBuilder::new(transport).build()
    }

    /// Start building a client.
    pub fn builder(transport: impl Transport + 'static) -> FletchBuilder {
        FletchBuilder::new(transport)
    }

    /// Create a client over `reqwest`.
    #[cfg(feature = "http")]
    pub fn http() -> Self {
        Self::new(crate::transport::HttpTransport::new())
    }

    /// The instance registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Configure an instance, replacing any of the same name.
    pub fn configure(&self, options: InstanceOptions) -> Result<Arc<Instance>> {
        self.inner.registry.configure(options)
    }

    /// Look up an instance, creating a default one on a miss.
    pub fn instance(&self, name: Option<&str>) -> Result<Arc<Instance>> {
        self.inner.registry.resolve(name)
    }

    /// Abort every in-flight dispatch against an instance.
    pub fn abort_current(&self, name: Option<&str>) -> Result<()> {
        self.instance(name)?.abort_current();
        Ok(())
    }

    /// Send a single request or a batch.
    pub async fn send(
        &self,
        outgoing: impl Into<Outgoing>,
        waiting: Option<WaitingToggle>,
    ) -> Result<Dispatched> {
        match outgoing.into() {
            Outgoing::Single(request) => {
                Ok(Dispatched::Single(self.run_single(request, waiting).await?))
            }
            Outgoing::Batch(requests) => {
                Ok(Dispatched::Batch(self.run_batch(requests, waiting).await?))
            }
        }
    }

    /// Send one request.
    ///
    /// Fails with [`FletchError::Usage`] when given a batch.
    pub async fn send_single(
        &self,
        outgoing: impl Into<Outgoing>,
        waiting: Option<WaitingToggle>,
    ) -> Result<Outcome> {
        match outgoing.into() {
            Outgoing::Single(request) => self.run_single(request, waiting).await,
            Outgoing::Batch(_) => Err(FletchError::usage(
                "send_single expects one request; use send_multiple for batches",
            )),
        }
    }

    /// Send a batch of requests.
    ///
    /// Fails with [`FletchError::Usage`] when given a single request or an
    /// empty batch.
    pub async fn send_multiple(
        &self,
        outgoing: impl Into<Outgoing>,
        waiting: Option<WaitingToggle>,
    ) -> Result<BatchOutcome> {
        match outgoing.into() {
            Outgoing::Batch(requests) => self.run_batch(requests, waiting).await,
            Outgoing::Single(_) => Err(FletchError::usage(
                "send_multiple expects a batch; use send_single for one request",
            )),
        }
    }

    async fn run_single(&self, request: Request, waiting: Option<WaitingToggle>) -> Result<Outcome> {
        let instance = self.instance(request.instance_name.as_deref())?;
        let request = prepare(request, &instance);
        let waiting = Waiting::new(waiting);

        if let Some(outcome) = self.cached(&request, &instance) {
            waiting.start();
            waiting.finish();
            return Ok(outcome);
        }

        let shared = Arc::new(Mutex::new(request));
        let (timeout, tiers) = instance.read(|c| (c.timeout, c.max_retry_tiers));
        let mut race = TimeoutRace::new(timeout, tiers);

        let result = race
            .run(
                |_| {
                    waiting.start();
                    self.attempt(shared.clone(), instance.clone()).boxed()
                },
                || instance.abort_current(),
            )
            .await;

        let outcome = match result {
            RaceResult::Settled(outcome) => outcome,
            RaceResult::TimedOut => {
                let sent = shared.lock().clone();
                Outcome::Failure(EvaluatedResponse::timed_out(sent))
            }
        };

        self.remember(&outcome, &instance);
        waiting.finish();
        Ok(outcome)
    }

    async fn attempt(&self, shared: Arc<Mutex<Request>>, instance: Arc<Instance>) -> Outcome {
        let response = self.dispatch(&shared, &instance).await;
        if response.success {
            return Outcome::Success(response);
        }

        let (response, rule, suppression) = select_rule(response, &shared, &instance);
        let Some(rule) = rule else {
            return Outcome::Failure(response);
        };

        let ctx = RetryContext::new(self.clone(), instance);
        let outcome = rule.action.invoke(response, ctx).await;
        if let Some(suppression) = suppression {
            suppression.release();
        }
        outcome
    }

    /// Dispatch the current state of a request once and evaluate it.
    pub(crate) async fn dispatch(
        &self,
        shared: &Mutex<Request>,
        instance: &Instance,
    ) -> EvaluatedResponse {
        let snapshot = shared.lock().clone();
        let cancel = instance.cancellation_token();

        debug!(
            instance = %instance.name(),
            method = %snapshot.effective_method(),
            path = %snapshot.path,
            "Dispatching request"
        );

        let raw = match self.inner.transport.attempt(&snapshot, cancel).await {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path = %snapshot.path, error = %err, "Dispatch produced no response");
                err.into_raw()
            }
        };

        EvaluatedResponse::evaluate(raw, snapshot, &instance.success_codes())
    }

    fn cached(&self, request: &Request, instance: &Instance) -> Option<Outcome> {
        let cache = self.inner.cache.as_ref()?;
        let policy = request.cache.as_ref()?;
        let key = policy.key(instance.name(), &request.path);

        match cache::lookup(cache.as_ref(), &key) {
            Ok(Some(entry)) => {
                debug!(key = %key, "Serving response from cache");
                Some(Outcome::Success(EvaluatedResponse {
                    success: true,
                    status_code: entry.status_code,
                    body: entry.body,
                    sent: request.clone(),
                }))
            }
            Ok(None) => None,
            Err(err) => {
                warn!(key = %key, error = %err, "Cache lookup failed");
                None
            }
        }
    }

    fn remember(&self, outcome: &Outcome, instance: &Instance) {
        let (Some(cache), Outcome::Success(response)) = (self.inner.cache.as_ref(), outcome) else {
            return;
        };
        let Some(policy) = response.sent.cache.as_ref() else {
            return;
        };

        let key = policy.key(instance.name(), &response.sent.path);
        if let Err(err) = cache::record(cache.as_ref(), &key, response, policy) {
            warn!(key = %key, error = %err, "Failed to cache response");
        }
    }
}

/// Pick the retry rule for a failed response, consuming a matching local
/// rule from the shared request.
pub(crate) fn select_rule(
    mut response: EvaluatedResponse,
    shared: &Mutex<Request>,
    instance: &Arc<Instance>,
) -> (EvaluatedResponse, Option<RetryRule>, Option<Suppression>) {
    let mut request = shared.lock();
    let resolution = action::resolve(response.status_code, &mut request, instance);
    response.sent = request.clone();
    drop(request);

    let (rule, suppression) = resolution.into_parts();
    if rule.is_none() {
        debug!(
            status = response.status_code,
            path = %response.sent.path,
            "No retry rule for failed response"
        );
    }
    (response, rule, suppression)
}

/// Rewrite a request against its instance: prefix the base path, merge in
/// the instance headers and pin the instance name.
pub(crate) fn prepare(mut request: Request, instance: &Instance) -> Request {
    instance.read(|config| {
        if !config.base_path.is_empty() && !request.path.starts_with(&config.base_path) {
            request.path = format!("{}{}", config.base_path, request.path);
        }
        request.headers = combine(Some(&request.headers), Some(&config.headers));
    });
    if request.instance_name.is_none() {
        request.instance_name = Some(instance.name().to_string());
    }
    request
}

/// Tracks the waiting callback for one send.
pub(crate) struct Waiting {
    toggle: Option<WaitingToggle>,
}

impl Waiting {
    pub(crate) fn new(toggle: Option<WaitingToggle>) -> Self {
        Self { toggle }
    }

    pub(crate) fn start(&self) {
        if let Some(toggle) = &self.toggle {
            toggle(true);
        }
    }

    pub(crate) fn finish(self) {
        if let Some(toggle) = &self.toggle {
            toggle(false);
        }
    }
}
