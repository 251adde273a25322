//! Bounded polling used for instance readiness checks.
//!
//! Predicates report "not ready yet" as `false`. Only unexpected failures are
//! surfaced as errors, so a slow boot never aborts a valid wait.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Default number of predicate evaluations before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 30;

/// Default pause between two evaluations.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Retry budget applied to a readiness poll.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryBudget {
    /// Number of evaluations after which the poll gives up.
    pub max_retries: u32,
    /// Pause between two evaluations.
    pub interval: Duration,
}

impl RetryBudget {
    /// Creates a budget with explicit limits.
    #[must_use]
    pub const fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            interval,
        }
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_INTERVAL)
    }
}

/// Polls `predicate` until it reports `true` or the budget is exhausted.
///
/// Returns `true` as soon as the predicate succeeds and `false` once
/// `max_retries` evaluations have failed. Exhaustion is not an error; callers
/// decide whether a timeout is fatal.
pub async fn wait_until<F, Fut>(budget: RetryBudget, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let outcome: Result<bool, std::convert::Infallible> =
        try_wait_until(budget, || {
            let evaluation = predicate();
            async move { Ok(evaluation.await) }
        })
        .await;
    outcome.unwrap_or_else(|never| match never {})
}

/// Fallible variant of [`wait_until`].
///
/// The predicate may fail with an unclassified error, which stops the poll
/// immediately and is returned to the caller.
///
/// # Errors
///
/// Propagates the first error returned by `predicate`.
pub async fn try_wait_until<F, Fut, E>(budget: RetryBudget, mut predicate: F) -> Result<bool, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let mut attempts: u32 = 0;
    loop {
        if predicate().await? {
            return Ok(true);
        }

        attempts = attempts.saturating_add(1);
        if attempts >= budget.max_retries {
            return Ok(false);
        }

        sleep(budget.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    const NO_WAIT: RetryBudget = RetryBudget::new(3, Duration::ZERO);

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Cell::new(0_u32);
        let ready = wait_until(NO_WAIT, || {
            calls.set(calls.get() + 1);
            async { false }
        })
        .await;

        assert!(!ready);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn stops_once_predicate_succeeds() {
        let calls = Cell::new(0_u32);
        let ready = wait_until(NO_WAIT, || {
            calls.set(calls.get() + 1);
            let current = calls.get();
            async move { current == 2 }
        })
        .await;

        assert!(ready);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn propagates_predicate_errors() {
        let calls = Cell::new(0_u32);
        let result: Result<bool, String> = try_wait_until(NO_WAIT, || {
            calls.set(calls.get() + 1);
            async { Err(String::from("boom")) }
        })
        .await;

        assert_eq!(result, Err(String::from("boom")));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn default_budget_is_thirty_attempts_every_five_seconds() {
        let budget = RetryBudget::default();
        assert_eq!(budget.max_retries, 30);
        assert_eq!(budget.interval, Duration::from_secs(5));
    }
}
