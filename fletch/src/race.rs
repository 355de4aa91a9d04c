//! The timeout/retry race.
//!
//! An attempt is raced against a ladder of deadlines. With a per-tier
//! timeout `T` and `N` retry tiers the ladder holds `N` retry deadlines at
//! `T×1 … T×N` and one final deadline at `T×(N+1)`:
//!
//! ```text
//! idle ─▶ in-flight ─┬─▶ completed            (attempt settled first)
//!            ▲       ├─▶ retrying ─┐          (retry deadline: abort, re-launch)
//!            └───────┼─────────────┘
//!                    └─▶ timed-out            (final deadline: abort)
//! ```
//!
//! A zero timeout disables the ladder: one attempt runs and the race never
//! times out. Settling cancels every pending deadline before the result is
//! returned, and a superseded attempt is dropped, so a stale attempt can
//! never settle the race.

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// A deadline on the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Abort the attempt and launch retry number `n` (1-based).
    Retry(u32),
    /// Abort the attempt and declare a timeout.
    Final,
}

/// The deadlines of a race, computed one at a time.
///
/// Step `k` fires at `start + timeout×k`; steps `1..=tiers` are retries and
/// step `tiers + 1` is final. A deadline past the clock's range is never
/// reached, so the ladder simply stops there.
#[derive(Debug, Clone)]
pub struct TimerLadder {
    start: Instant,
    timeout: Duration,
    tiers: u32,
    next: u64,
}

impl TimerLadder {
    /// Schedule the ladder from `start`.
    pub fn schedule(start: Instant, timeout: Duration, tiers: u32) -> Self {
        Self {
            start,
            timeout,
            tiers,
            next: 1,
        }
    }

    fn last(&self) -> u64 {
        u64::from(self.tiers) + 1
    }

    /// The next deadline, if any is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.next > self.last() {
            return None;
        }
        let nanos = self.timeout.as_nanos().checked_mul(u128::from(self.next))?;
        let offset = Duration::from_nanos(u64::try_from(nanos).ok()?);
        self.start.checked_add(offset)
    }

    /// Pop the next deadline.
    pub fn fire(&mut self) -> Option<Tier> {
        let step = self.next;
        if step > self.last() {
            return None;
        }
        self.next += 1;
        match u32::try_from(step) {
            Ok(n) if n <= self.tiers => Some(Tier::Retry(n)),
            _ => Some(Tier::Final),
        }
    }

    /// Cancel every pending deadline.
    pub fn cancel_all(&mut self) {
        self.next = self.last() + 1;
    }

    /// Number of pending deadlines.
    pub fn pending(&self) -> u64 {
        (self.last() + 1).saturating_sub(self.next)
    }
}

/// Where a race is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceState {
    /// Not started.
    Idle,
    /// An attempt is running; `tier` 0 is the initial attempt.
    InFlight {
        /// Current tier.
        tier: u32,
    },
    /// A retry deadline fired and the attempt is being re-launched.
    Retrying {
        /// Tier being launched.
        tier: u32,
    },
    /// An attempt settled.
    Completed,
    /// The final deadline fired.
    TimedOut,
}

impl RaceState {
    /// Whether the race has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut)
    }
}

/// How a race ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceResult<T> {
    /// An attempt settled with this value.
    Settled(T),
    /// The final deadline fired first.
    TimedOut,
}

/// Races attempts against a timer ladder.
#[derive(Debug)]
pub struct TimeoutRace {
    timeout: Duration,
    tiers: u32,
    state: RaceState,
}

impl TimeoutRace {
    /// Create a race with a per-tier timeout and a number of retry tiers.
    pub fn new(timeout: Duration, tiers: u32) -> Self {
        Self {
            timeout,
            tiers,
            state: RaceState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> RaceState {
        self.state
    }

    /// Run the race.
    ///
    /// `launch(tier)` starts an attempt; it is called with 0 for the initial
    /// attempt and with the tier number for each retry. `abort` is called
    /// before every re-launch and before declaring a timeout.
    pub async fn run<'a, T, L, A>(&mut self, mut launch: L, mut abort: A) -> RaceResult<T>
    where
        L: FnMut(u32) -> BoxFuture<'a, T>,
        A: FnMut(),
    {
        self.state = RaceState::InFlight { tier: 0 };
        let mut attempt = launch(0);

        if self.timeout.is_zero() {
            let value = attempt.await;
            self.state = RaceState::Completed;
            return RaceResult::Settled(value);
        }

        let mut ladder = TimerLadder::schedule(Instant::now(), self.timeout, self.tiers);
        loop {
            let Some(deadline) = ladder.next_deadline() else {
                let value = attempt.await;
                self.state = RaceState::Completed;
                return RaceResult::Settled(value);
            };

            tokio::select! {
                biased;

                value = &mut attempt => {
                    ladder.cancel_all();
                    self.state = RaceState::Completed;
                    return RaceResult::Settled(value);
                }
                _ = sleep_until(deadline) => match ladder.fire() {
                    Some(Tier::Retry(tier)) => {
                        warn!(
                            tier,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "Timeout limit reached without a network response, retrying"
                        );
                        self.state = RaceState::Retrying { tier };
                        abort();
                        attempt = launch(tier);
                        self.state = RaceState::InFlight { tier };
                    }
                    Some(Tier::Final) | None => {
                        abort();
                        ladder.cancel_all();
                        warn!(
                            tiers = self.tiers,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "Request timed out"
                        );
                        self.state = RaceState::TimedOut;
                        return RaceResult::TimedOut;
                    }
                },
            }
            debug!(pending = ladder.pending(), "Attempt re-launched");
        }
    }
}
