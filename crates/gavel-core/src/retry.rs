//! Bounded retry with capped-exponential backoff for navigation and
//! extraction steps.
//!
//! Transient failures (timeouts, navigation errors, empty-but-expected
//! pages) are retried with an increasing delay. Permanent failures such as
//! a missing field short-circuit immediately: retrying cannot fix a
//! structural mismatch.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ScrapeError;

/// Retry configuration for a single fallible step.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Clamped to at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt afterwards.
    pub base_delay: Duration,
    /// Upper bound on any single backoff sleep.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Backoff after a failed attempt (1-indexed): base, 2x, 4x, ... capped.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }
}

/// Run `op` up to `policy.max_attempts` times.
///
/// Returns the first success, short-circuits on permanent errors, and
/// yields [`ScrapeError::RetryExhausted`] wrapping the last transient error
/// once attempts run out. The backoff sleep is interrupted by `cancel`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, ScrapeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last: Option<ScrapeError> = None;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                tracing::debug!(attempt, error = %e, "transient failure");
                last = Some(e);
                if attempt < max_attempts {
                    let delay = policy.delay_after_attempt(attempt);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => return Err(ScrapeError::Cancelled),
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }

    match last {
        Some(e) => Err(ScrapeError::RetryExhausted {
            attempts: max_attempts,
            last: Box::new(e),
        }),
        // Unreachable with max_attempts >= 1; kept total for safety.
        None => Err(ScrapeError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    fn timeout_err() -> ScrapeError {
        ScrapeError::NavigationTimeout {
            url: "https://example.com".into(),
            seconds: 30,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_after_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after_attempt(3), Duration::from_secs(5));
        assert_eq!(policy.delay_after_attempt(10), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result = with_retry(&fast_policy(3), &CancellationToken::new(), move || {
            let calls = calls2.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(timeout_err())
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_only_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<(), _> =
            with_retry(&fast_policy(3), &CancellationToken::new(), move || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(timeout_err())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            ScrapeError::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ScrapeError::NavigationTimeout { .. }));
            }
            other => panic!("expected RetryExhausted, got {other}"),
        }
    }

    #[tokio::test]
    async fn permanent_error_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<(), _> =
            with_retry(&fast_policy(3), &CancellationToken::new(), move || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ScrapeError::MissingField { field: "address" })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.unwrap_err(),
            ScrapeError::MissingField { .. }
        ));
    }

    #[tokio::test]
    async fn cancellation_stops_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), _> = with_retry(&fast_policy(3), &cancel, || async {
            panic!("op must not run after cancellation")
        })
        .await;

        assert!(matches!(result.unwrap_err(), ScrapeError::Cancelled));
    }
}
