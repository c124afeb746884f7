//! Exponential backoff with optional jitter.

use std::time::Duration;

use rand::Rng;

/// Delay schedule and retry budget for reconnect attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor between consecutive retries.
    pub multiplier: f64,
    /// Cap applied to every computed delay.
    pub max_delay: Duration,
    /// Attempts allowed before giving up.
    pub retry_limit: u32,
    /// Extra random delay as a fraction of the computed delay.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(2_000),
            multiplier: 1.5,
            max_delay: Duration::from_millis(20_000),
            retry_limit: 15,
            jitter: 0.0,
        }
    }
}

impl BackoffPolicy {
    /// Policy with the default growth and cap.
    pub fn new(retry_limit: u32, base_delay: Duration) -> Self {
        Self {
            base_delay,
            retry_limit,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// `min(base * multiplier^(attempt-1), max_delay)`, plus jitter when set.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let capped_ms = (base_ms * self.multiplier.powi(exponent)).min(max_ms);
        let capped = Duration::from_millis(capped_ms.round() as u64);

        if self.jitter <= 0.0 {
            return capped;
        }

        let jitter_range = (capped.as_millis() as f64 * self.jitter) as u64;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };
        capped + Duration::from_millis(jitter)
    }
}

/// Outcome of asking for another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reconnect as attempt `attempt` after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// The retry budget is spent.
    Exhausted { attempts: u32 },
}

/// Consecutive-failure counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
}

impl RetryState {
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failure and decide whether to retry.
    pub fn next(&mut self, policy: &BackoffPolicy) -> RetryDecision {
        if self.attempt >= policy.retry_limit {
            return RetryDecision::Exhausted {
                attempts: self.attempt,
            };
        }
        self.attempt += 1;
        RetryDecision::Retry {
            attempt: self.attempt,
            delay: policy.delay_for(self.attempt),
        }
    }

    /// Forget previous failures.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
