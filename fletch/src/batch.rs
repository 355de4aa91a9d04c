//! Batch orchestration.
//!
//! Every member of a batch is resolved against its own instance, but the
//! batch shares one timeout ladder: the longest timeout and the most retry
//! tiers among the referenced instances. Each attempt dispatches all
//! members concurrently. Successes and failures no rule handles settle
//! first, in batch order; failures handed to a retry action settle as their
//! actions complete and are appended in completion order. Instance rules
//! suppressed for those retries are restored once every action has
//! settled.

use crate::action::{RetryContext, Suppression};
use crate::client::{prepare, select_rule, Fletch, Waiting, WaitingToggle};
use crate::config::Instance;
use crate::error::{FletchError, Result};
use crate::race::{RaceResult, TimeoutRace};
use crate::request::Request;
use crate::response::{BatchOutcome, EvaluatedResponse, Outcome};
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

struct Member {
    request: Arc<Mutex<Request>>,
    instance: Arc<Instance>,
}

impl Fletch {
    pub(crate) async fn run_batch(
        &self,
        requests: Vec<Request>,
        waiting: Option<WaitingToggle>,
    ) -> Result<BatchOutcome> {
        if requests.is_empty() {
            return Err(FletchError::usage("send_multiple expects at least one request"));
        }

        let mut members = Vec::with_capacity(requests.len());
        for request in requests {
            let instance = self.instance(request.instance_name.as_deref())?;
            let request = prepare(request, &instance);
            members.push(Member {
                request: Arc::new(Mutex::new(request)),
                instance,
            });
        }

        let mut instances: Vec<Arc<Instance>> = Vec::new();
        for member in &members {
            if !instances.iter().any(|i| Arc::ptr_eq(i, &member.instance)) {
                instances.push(member.instance.clone());
            }
        }

        let timeout = instances
            .iter()
            .map(|i| i.timeout())
            .max()
            .unwrap_or(Duration::ZERO);
        let tiers = instances
            .iter()
            .map(|i| i.max_retry_tiers())
            .max()
            .unwrap_or(0);

        debug!(
            members = members.len(),
            instances = instances.len(),
            timeout_ms = timeout.as_millis() as u64,
            tiers,
            "Dispatching batch"
        );

        let waiting = Waiting::new(waiting);
        let mut race = TimeoutRace::new(timeout, tiers);
        let result = race
            .run(
                |_| {
                    waiting.start();
                    self.attempt_batch(&members).boxed()
                },
                || {
                    for instance in &instances {
                        instance.abort_current();
                    }
                },
            )
            .await;

        let outcome = match result {
            RaceResult::Settled(outcomes) => {
                let success = outcomes.iter().all(Outcome::is_success);
                let responses = outcomes.into_iter().map(Outcome::into_response).collect();
                if success {
                    BatchOutcome::Success(responses)
                } else {
                    BatchOutcome::Failure(responses)
                }
            }
            RaceResult::TimedOut => BatchOutcome::Failure(
                members
                    .iter()
                    .map(|m| {
                        let sent = m.request.lock().clone();
                        EvaluatedResponse::timed_out(sent)
                    })
                    .collect(),
            ),
        };

        waiting.finish();
        Ok(outcome)
    }

    async fn attempt_batch(&self, members: &[Member]) -> Vec<Outcome> {
        let responses = join_all(
            members
                .iter()
                .map(|m| self.dispatch(&m.request, &m.instance)),
        )
        .await;

        let mut settled = Vec::with_capacity(members.len());
        let mut retries = FuturesUnordered::new();
        let mut suppressions: Vec<Suppression> = Vec::new();

        for (member, response) in members.iter().zip(responses) {
            if response.success {
                settled.push(Outcome::Success(response));
                continue;
            }

            let (response, rule, suppression) =
                select_rule(response, &member.request, &member.instance);
            let Some(rule) = rule else {
                settled.push(Outcome::Failure(response));
                continue;
            };

            suppressions.extend(suppression);
            let ctx = RetryContext::new(self.clone(), member.instance.clone());
            retries.push(async move { rule.action.invoke(response, ctx).await });
        }

        if !retries.is_empty() {
            debug!(retries = retries.len(), "Waiting on batch retries");
        }
        while let Some(outcome) = retries.next().await {
            settled.push(outcome);
        }

        for suppression in suppressions {
            suppression.release();
        }
        settled
    }
}

#[cfg(test)]
mod tests {
    use crate::action::RetryRule;
    use crate::client::{Fletch, WaitingToggle};
    use crate::config::InstanceOptions;
    use crate::error::FletchError;
    use crate::mock::{MockReply, MockTransport};
    use crate::request::Request;
    use fletch_core::TIMED_OUT_MESSAGE;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_all_succeed_in_order() {
        let transport = MockTransport::new()
            .with_reply("/a", MockReply::respond(200, "a"))
            .with_reply("/b", MockReply::respond(201, "b"));
        let fletch = Fletch::new(transport.clone());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let toggle: WaitingToggle = Arc::new(move |w| sink.lock().push(w));

        let outcome = assert_ok!(
            fletch
                .send_multiple(vec![Request::get("/a"), Request::get("/b")], Some(toggle))
                .await
        );

        assert!(outcome.is_success());
        let bodies: Vec<_> = outcome.responses().iter().map(|r| r.text()).collect();
        assert_eq!(bodies, vec![Some("a"), Some("b")]);
        assert_eq!(*calls.lock(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_any_failure_fails_batch() {
        let transport = MockTransport::new()
            .with_reply("/a", MockReply::respond(200, "a"))
            .with_reply("/b", MockReply::respond(500, "b"));
        let fletch = Fletch::new(transport);

        let outcome = assert_ok!(
            fletch
                .send_multiple(vec![Request::get("/a"), Request::get("/b")], None)
                .await
        );

        assert!(!outcome.is_success());
        let flags: Vec<_> = outcome.responses().iter().map(|r| r.success).collect();
        assert_eq!(flags, vec![true, false]);
    }

    #[tokio::test]
    async fn test_retried_member_restores_rule() {
        let transport = MockTransport::new()
            .with_reply("/a", MockReply::respond(200, "a"))
            .with_reply("/b", MockReply::respond(408, "slow"))
            .with_reply("/b", MockReply::respond(200, "b"));
        let fletch = Fletch::new(transport.clone());

        let outcome = assert_ok!(
            fletch
                .send_multiple(vec![Request::get("/a"), Request::get("/b")], None)
                .await
        );

        assert!(outcome.is_success());
        assert_eq!(outcome.responses().len(), 2);
        assert_eq!(transport.calls_to("/b"), 2);

        let instance = fletch.instance(None).unwrap();
        instance.read(|config| {
            assert!(config.retry_rules.iter().all(|r| r.paths_to_ignore.is_empty()));
        });
    }

    #[tokio::test]
    async fn test_retried_members_are_appended() {
        let transport = MockTransport::new();
        let fletch = Fletch::new(transport.clone());
        transport.push_reply("/first", MockReply::respond(504, "first failed"));
        transport.push_reply("/first", MockReply::respond(200, "first retried"));
        transport.push_reply("/second", MockReply::respond(200, "second"));

        let outcome = assert_ok!(
            fletch
                .send_multiple(vec![Request::get("/first"), Request::get("/second")], None)
                .await
        );

        assert!(outcome.is_success());
        let bodies: Vec<_> = outcome.responses().iter().map(|r| r.text()).collect();
        assert_eq!(bodies, vec![Some("second"), Some("first retried")]);
    }

    #[tokio::test]
    async fn test_same_path_retried_once() {
        let transport = MockTransport::new().with_default(MockReply::respond(504, "busy"));
        let fletch = Fletch::new(transport.clone());

        let outcome = assert_ok!(
            fletch
                .send_multiple(vec![Request::get("/a"), Request::get("/a")], None)
                .await
        );

        // The second member sees the rule suppressed for its path.
        assert!(!outcome.is_success());
        assert_eq!(transport.calls_to("/a"), 3);
        fletch.instance(None).unwrap().read(|config| {
            assert!(config.retry_rules.iter().all(|r| r.paths_to_ignore.is_empty()));
        });
    }

    #[tokio::test]
    async fn test_local_rules_per_member() {
        let transport = MockTransport::new().with_default(MockReply::respond(418, "teapot"));
        let fletch = Fletch::new(transport);
        let settle = RetryRule::from_fn(418, |failed, _ctx| async move {
            crate::response::Outcome::Success(failed)
        });

        let outcome = assert_ok!(
            fletch
                .send_multiple(
                    vec![Request::get("/a").retry_rule(settle), Request::get("/b")],
                    None
                )
                .await
        );

        assert!(!outcome.is_success());
        let paths: Vec<_> = outcome.responses().iter().map(|r| r.sent.path.as_str()).collect();
        assert_eq!(paths, vec!["/b", "/a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_uses_longest_ladder() {
        let transport = MockTransport::new()
            .with_reply("/quick", MockReply::respond(200, "quick"))
            .with_default(MockReply::Hang);
        let fletch = Fletch::new(transport.clone());
        assert_ok!(fletch.configure(
            InstanceOptions::named("short")
                .timeout(Duration::from_millis(100))
                .max_retry_tiers(0)
        ));
        assert_ok!(fletch.configure(
            InstanceOptions::named("long")
                .timeout(Duration::from_millis(500))
                .max_retry_tiers(1)
        ));
        let started = tokio::time::Instant::now();

        let outcome = assert_ok!(
            fletch
                .send_multiple(
                    vec![
                        Request::get("/quick").instance("short"),
                        Request::get("/slow").instance("long"),
                    ],
                    None
                )
                .await
        );

        assert!(!outcome.is_success());
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
        assert_eq!(transport.calls_to("/slow"), 2);
        for response in outcome.responses() {
            assert_eq!(response.text(), Some(TIMED_OUT_MESSAGE));
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_usage_error() {
        let fletch = Fletch::new(MockTransport::new());
        let err = assert_err!(fletch.send_multiple(Vec::<Request>::new(), None).await);
        assert!(matches!(err, FletchError::Usage(_)));
    }
}
