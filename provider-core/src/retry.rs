//! Bounded retries with exponential, jittered backoff.
//!
//! A [`Backoff`] counts total attempts, so `attempts: 1` means "try once".
//! Handlers that detect their own races (lost compare-and-set, moved
//! indexes) drive the schedule themselves through [`Backoff::delay`];
//! plain remote calls go through [`retry_transient`].

use crate::error::{ErrorKind, ProviderError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    pub attempts: u32,
    pub initial: Duration,
    pub max: Duration,
    pub factor: f64,
    /// Upper bound of the random extra delay, as a fraction of the base delay.
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            factor: 2.0,
            jitter: 0.25,
        }
    }
}

impl Backoff {
    /// Idempotent reads against the API: few attempts, short waits.
    pub fn reads() -> Self {
        Self {
            attempts: 3,
            initial: Duration::from_millis(50),
            max: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// Read-modify-write loops that lose races to other writers.
    pub fn contended(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            initial: Duration::from_millis(50),
            max: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Whether `failed` attempts (counting from one) leave budget for another.
    pub fn allows_another(&self, failed: u32) -> bool {
        failed < self.attempts
    }

    /// Wait before the attempt following the `failed`-th failure.
    pub fn delay(&self, failed: u32) -> Duration {
        let exponent = failed.saturating_sub(1).min(32) as i32;
        let base = (self.initial.as_millis() as f64 * self.factor.powi(exponent))
            .min(self.max.as_millis() as f64);
        let extra = if self.jitter > 0.0 {
            base * rand::thread_rng().gen_range(0.0..self.jitter)
        } else {
            0.0
        };
        Duration::from_millis((base + extra) as u64)
    }
}

/// Only an unreachable or overloaded server is worth asking again. A call
/// the caller cancelled is not.
pub fn is_transient(error: &ProviderError) -> bool {
    error.kind() == ErrorKind::Unavailable && !error.is_cancelled()
}

/// Run `call` until it succeeds, fails permanently, or the budget runs out.
/// The last error is returned unchanged.
pub async fn retry_transient<F, Fut, T>(backoff: &Backoff, what: &str, call: F) -> Result<T, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut failed = 0;
    loop {
        let error = match call().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        failed += 1;
        if !is_transient(&error) || !backoff.allows_another(failed) {
            if failed > 1 {
                warn!(call = what, attempts = failed, kind = %error.kind(), "Giving up");
            }
            return Err(error);
        }
        let wait = backoff.delay(failed);
        debug!(call = what, attempt = failed, wait_ms = wait.as_millis() as u64, error = %error, "Transient failure");
        sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant(attempts: u32) -> Backoff {
        Backoff {
            attempts,
            initial: Duration::from_millis(1),
            jitter: 0.0,
            ..Backoff::default()
        }
    }

    #[test]
    fn test_delay_doubles_up_to_the_cap() {
        let b = Backoff {
            jitter: 0.0,
            ..Backoff::default()
        };
        assert_eq!(b.delay(1), Duration::from_millis(100));
        assert_eq!(b.delay(2), Duration::from_millis(200));
        assert_eq!(b.delay(3), Duration::from_millis(400));
        assert_eq!(b.delay(40), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let b = Backoff::default();
        for _ in 0..50 {
            let d = b.delay(1);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(125));
        }
    }

    #[test]
    fn test_contended_never_drops_below_one_attempt() {
        let b = Backoff::contended(0);
        assert_eq!(b.attempts, 1);
        assert!(!b.allows_another(1));
        assert!(Backoff::contended(3).allows_another(2));
        assert!(!Backoff::contended(3).allows_another(3));
    }

    #[tokio::test]
    async fn test_unavailable_is_retried() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(&instant(3), "op", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ProviderError::unavailable("503"))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_budget_counts_the_first_call() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(&instant(3), "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<i32, _>(ProviderError::unavailable("503"))
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Unavailable);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_call_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(&instant(3), "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<i32, _>(ProviderError::cancelled())
        })
        .await;
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(&instant(3), "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<i32, _>(ProviderError::not_found("missing"))
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
