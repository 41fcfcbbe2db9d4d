//! Bounded retry policy for pushing pending records.
//!
//! Every sync cycle asks the policy what to do with each pending record
//! before pushing it. Failed attempts back off exponentially, and once the
//! attempt budget is spent the record is abandoned instead of being retried
//! forever.

use crate::{Record, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with a pending record in this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    /// Push it now
    Attempt,
    /// Too soon after the last failure; skip until `retry_at`
    Backoff { retry_at: Timestamp },
    /// Attempt budget exhausted
    Abandon,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of push attempts per record.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_backoff: Duration,
    /// Upper bound for any delay.
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Creates a policy with the default delays.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(3600),
            multiplier: 2.0,
        }
    }

    /// Retry on every cycle without delay, still capped at `max_attempts`.
    pub fn every_cycle(max_attempts: u32) -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            ..Self::new(max_attempts)
        }
    }

    /// Sets the initial backoff.
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Sets the maximum backoff.
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay to wait after `failures` failed attempts.
    pub fn backoff_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }

    /// Decide what to do with `record` at `now`.
    pub fn decide(&self, record: &Record, now: Timestamp) -> PushDecision {
        let state = &record.push;
        if state.attempts >= self.max_attempts {
            return PushDecision::Abandon;
        }
        if let Some(last) = state.last_attempt_at {
            let retry_at = chrono::Duration::from_std(self.backoff_after(state.attempts))
                .ok()
                .and_then(|wait| last.checked_add_signed(wait));
            if let Some(retry_at) = retry_at {
                if now < retry_at {
                    return PushDecision::Backoff { retry_at };
                }
            }
        }
        PushDecision::Attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}
