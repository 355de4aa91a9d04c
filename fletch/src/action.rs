//! Retry actions and the rule resolver.
//!
//! A [`RetryRule`] binds a status code to a [`RetryAction`]. Rules live
//! either on an instance (global, shared by every request) or on a single
//! request (local, consumed the first time they fire).
//!
//! When a request fails, [`resolve`] picks at most one rule:
//!
//! 1. The first global rule for the status, unless its ignore-list holds
//!    the request path.
//! 2. A matching local rule, which overrides the global pick and is
//!    removed from the request.
//!
//! A selected global rule is suppressed for the request path while its
//! retry runs, so the retry cannot re-trigger it. The returned
//! [`Suppression`] guard lifts the suppression when released or dropped.

use crate::client::Fletch;
use crate::config::Instance;
use crate::request::Request;
use crate::response::{EvaluatedResponse, Outcome};
use async_trait::async_trait;
use fletch_core::RawResponse;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Behaviour invoked when a rule fires.
///
/// An action settles the failed request: it may re-send it through the
/// context's client, or settle it directly without sending anything.
#[async_trait]
pub trait RetryAction: Send + Sync {
    /// React to a failed response.
    async fn invoke(&self, failed: EvaluatedResponse, ctx: RetryContext) -> Outcome;
}

/// What a retry action can reach while it runs.
#[derive(Debug, Clone)]
pub struct RetryContext {
    client: Fletch,
    instance: Arc<Instance>,
}

impl RetryContext {
    pub(crate) fn new(client: Fletch, instance: Arc<Instance>) -> Self {
        Self { client, instance }
    }

    /// The client that dispatched the failed request.
    pub fn client(&self) -> &Fletch {
        &self.client
    }

    /// The instance the failed request was sent against.
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Send the request again, with its own timeout ladder.
    pub async fn resend(&self, request: Request) -> Outcome {
        match self.client.send_single(request.clone(), None).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(path = %request.path, error = %err, "Resend could not be dispatched");
                Outcome::Failure(EvaluatedResponse::evaluate(
                    RawResponse::unknown_error(err),
                    request,
                    &[],
                ))
            }
        }
    }
}

/// The built-in action: send the original request again.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resend;

#[async_trait]
impl RetryAction for Resend {
    async fn invoke(&self, failed: EvaluatedResponse, ctx: RetryContext) -> Outcome {
        ctx.resend(failed.sent).await
    }
}

/// An action backed by an async closure.
pub struct ActionFn<F> {
    f: F,
}

impl<F> ActionFn<F> {
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> RetryAction for ActionFn<F>
where
    F: Fn(EvaluatedResponse, RetryContext) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    async fn invoke(&self, failed: EvaluatedResponse, ctx: RetryContext) -> Outcome {
        (self.f)(failed, ctx).await
    }
}

/// A status code bound to a retry action.
#[derive(Clone)]
pub struct RetryRule {
    /// Status code that triggers the rule.
    pub code: u16,
    /// Behaviour to invoke.
    pub action: Arc<dyn RetryAction>,
    /// Request paths for which the rule is ignored.
    pub paths_to_ignore: Vec<String>,
}

impl std::fmt::Debug for RetryRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryRule")
            .field("code", &self.code)
            .field("paths_to_ignore", &self.paths_to_ignore)
            .finish_non_exhaustive()
    }
}

impl RetryRule {
    /// Create a rule.
    pub fn new(code: u16, action: impl RetryAction + 'static) -> Self {
        Self {
            code,
            action: Arc::new(action),
            paths_to_ignore: Vec::new(),
        }
    }

    /// Create a rule that resends the request.
    pub fn resend(code: u16) -> Self {
        Self::new(code, Resend)
    }

    /// Create a rule from an async closure.
    pub fn from_fn<F, Fut>(code: u16, f: F) -> Self
    where
        F: Fn(EvaluatedResponse, RetryContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self::new(code, ActionFn::new(f))
    }

    /// Ignore the rule for a path.
    #[must_use]
    pub fn ignoring(mut self, path: impl Into<String>) -> Self {
        self.paths_to_ignore.push(path.into());
        self
    }

    /// Whether the rule is ignored for a path.
    pub fn ignores(&self, path: &str) -> bool {
        self.paths_to_ignore.iter().any(|p| p == path)
    }
}

/// The rule selected for a failed request.
#[derive(Debug)]
pub enum Resolution {
    /// No rule applies.
    Unhandled,
    /// A one-time rule taken from the request.
    Local(RetryRule),
    /// An instance rule, suppressed for the request path until released.
    Global {
        /// The selected rule.
        rule: RetryRule,
        /// Lifts the suppression when released or dropped.
        suppression: Suppression,
    },
}

impl Resolution {
    /// The selected rule, if any.
    pub fn rule(&self) -> Option<&RetryRule> {
        match self {
            Self::Unhandled => None,
            Self::Local(rule) | Self::Global { rule, .. } => Some(rule),
        }
    }

    /// Position of the selected rule in the instance list; `None` unless
    /// the rule is global.
    pub fn global_index(&self) -> Option<usize> {
        match self {
            Self::Global { suppression, .. } => Some(suppression.index),
            _ => None,
        }
    }

    /// Split into the rule and the suppression guard.
    pub fn into_parts(self) -> (Option<RetryRule>, Option<Suppression>) {
        match self {
            Self::Unhandled => (None, None),
            Self::Local(rule) => (Some(rule), None),
            Self::Global { rule, suppression } => (Some(rule), Some(suppression)),
        }
    }
}

/// Pick the rule that reacts to `status` for `request`.
pub fn resolve(status: u16, request: &mut Request, instance: &Arc<Instance>) -> Resolution {
    let path = request.path.clone();

    instance.update(|config| {
        let global = config
            .retry_rules
            .iter()
            .position(|rule| rule.code == status)
            .filter(|&index| !config.retry_rules[index].ignores(&path));

        if let Some(position) = request
            .retry_rules
            .iter()
            .position(|rule| rule.code == status && !rule.ignores(&path))
        {
            debug!(status, path = %path, "Selected one-time retry rule");
            return Resolution::Local(request.retry_rules.remove(position));
        }

        let Some(index) = global else {
            return Resolution::Unhandled;
        };

        let rule = &mut config.retry_rules[index];
        let selected = rule.clone();
        rule.paths_to_ignore.push(path.clone());
        debug!(
            instance = %instance.name(),
            status,
            path = %path,
            index,
            "Selected instance retry rule"
        );

        Resolution::Global {
            rule: selected,
            suppression: Suppression {
                instance: instance.clone(),
                index,
                code: status,
                path,
                active: true,
            },
        }
    })
}

/// Temporary suppression of a global rule for one path.
///
/// Restoration removes exactly the ignore-list entry added by [`resolve`]
/// and runs once, on [`release`](Self::release) or drop, whichever comes
/// first.
#[must_use = "dropping the suppression immediately restores the rule"]
pub struct Suppression {
    instance: Arc<Instance>,
    index: usize,
    code: u16,
    path: String,
    active: bool,
}

impl std::fmt::Debug for Suppression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suppression")
            .field("instance", &self.instance.name())
            .field("index", &self.index)
            .field("code", &self.code)
            .field("path", &self.path)
            .field("active", &self.active)
            .finish()
    }
}

impl Suppression {
    /// Index of the suppressed rule when it was selected.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The suppressed path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Lift the suppression now.
    pub fn release(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }

        let (code, path, hint) = (self.code, self.path.as_str(), self.index);
        let holds = |rule: &RetryRule| rule.code == code && rule.ignores(path);

        let restored = self.instance.update(|config| {
            let rules = &mut config.retry_rules;
            // The list may have been edited while the retry ran.
            let index = if rules.get(hint).is_some_and(|r| holds(r)) {
                Some(hint)
            } else {
                rules.iter().position(|r| holds(r))
            };

            let Some(index) = index else {
                return false;
            };
            let ignored = &mut rules[index].paths_to_ignore;
            if let Some(entry) = ignored.iter().rposition(|p| p == path) {
                ignored.remove(entry);
            }
            true
        });

        debug!(
            instance = %self.instance.name(),
            code,
            path = %path,
            restored,
            "Lifted retry rule suppression"
        );
    }
}

impl Drop for Suppression {
    fn drop(&mut self) {
        self.restore();
    }
}
