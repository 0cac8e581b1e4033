//! Retry policy with exponential backoff.
//!
//! Retrying is modeled as a bounded state machine rather than an inline
//! sleep/retry loop: `Attempting(n) → {Success, Failure → Attempting(n+1),
//! Exhausted}`. Delays come from the policy; actual sleeping goes through the
//! `Sleeper` trait so tests can observe the schedule without waiting.

use crate::config::FetchConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Injected sleep abstraction.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by `std::thread::sleep`.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
    /// Retry attempts after the initial request.
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn from_config(fetch: &FetchConfig) -> Self {
        Self {
            initial_backoff: Duration::from_secs(fetch.initial_backoff_secs),
            max_backoff: Duration::from_secs(fetch.max_backoff_secs),
            multiplier: fetch.backoff_multiplier,
            max_retries: fetch.max_retries,
        }
    }

    /// Delay before retry number `retry` (1-based): `initial * multiplier^(retry-1)`,
    /// capped at `max_backoff`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let factor = (self.multiplier as u64).saturating_pow(exponent);
        let secs = self.initial_backoff.as_secs().saturating_mul(factor);
        Duration::from_secs(secs).min(self.max_backoff)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Sleep this long, then retry.
    RetryAfter(Duration),
    /// All retries spent; the failure is permanent.
    Exhausted,
}

/// Bounded retry state for one request.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    failures: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, failures: 0 }
    }

    /// Retries consumed so far.
    pub fn retries(&self) -> u32 {
        self.failures.min(self.policy.max_retries)
    }

    /// Record a failed attempt and decide the next step.
    pub fn on_failure(&mut self) -> RetryOutcome {
        self.failures += 1;
        if self.failures > self.policy.max_retries {
            RetryOutcome::Exhausted
        } else {
            RetryOutcome::RetryAfter(self.policy.backoff_for(self.failures))
        }
    }
}
