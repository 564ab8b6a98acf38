//! Bounded retry budget shared by queue retries and answer continuation.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries (the first try is not counted)
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// A budget of attempts that need no pause in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    pub fn attempts(&self) -> RetryAttempts<'_> {
        RetryAttempts {
            policy: self,
            used: 0,
        }
    }
}

/// Tracks how much of a policy's budget one operation has consumed.
#[derive(Debug)]
pub struct RetryAttempts<'a> {
    policy: &'a RetryPolicy,
    used: u32,
}

impl RetryAttempts<'_> {
    /// Consumes one retry and returns the delay to wait before it, or
    /// `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.used >= self.policy.max_attempts {
            return None;
        }
        self.used += 1;
        Some(self.policy.delay)
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}

/// Sleeps for `delay` unless `cancelled` resolves first. Returns `false`
/// when cancelled.
pub async fn wait_unless_cancelled<F>(delay: Duration, cancelled: F) -> bool
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancelled => false,
    }
}
