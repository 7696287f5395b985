//! Bounded retry with a fixed inter-attempt delay.

use std::future::Future;
use std::time::Duration;

/// How often and how patiently an operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Start a fresh budget for one operation.
    #[must_use]
    pub fn budget(self) -> RetryBudget {
        RetryBudget {
            policy: self,
            attempt: 1,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(3))
    }
}

/// Attempt counter for a single operation. Not shared, not persisted.
#[derive(Debug)]
pub struct RetryBudget {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryBudget {
    /// The 1-based number of the attempt in progress.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the attempt in progress is the last one allowed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.policy.max_attempts
    }

    /// Called after a failed attempt: waits out the delay and returns
    /// `true` if another attempt is allowed, `false` once exhausted.
    pub async fn next_attempt(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        if !self.policy.delay.is_zero() {
            tokio::time::sleep(self.policy.delay).await;
        }
        self.attempt += 1;
        true
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// `op` receives the 1-based attempt number. `on_error` sees every failure
/// together with the attempt that produced it. Once exhausted, the error of
/// the last attempt is returned unchanged.
///
/// # Errors
///
/// Returns the last error produced by `op` after `max_attempts` failures.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    mut op: F,
    mut on_error: impl FnMut(u32, &E),
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut budget = policy.budget();
    loop {
        match op(budget.attempt()).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                on_error(budget.attempt(), &err);
                if !budget.next_attempt().await {
                    return Err(err);
                }
            }
        }
    }
}
