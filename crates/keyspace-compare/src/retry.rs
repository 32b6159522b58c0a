//! Bounded retries with exponential backoff.

use keyspace_types::Key;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{CompareError, SourceError};

/// How often and how patiently transient failures are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << (retry.saturating_sub(1)).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// Transient failures are retried; a fatal failure or the last transient
    /// one escalates to [`CompareError::FatalConnectivity`].
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        key: Option<&Key>,
        mut op: F,
    ) -> Result<T, CompareError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(SourceError::Transient(message)) if attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "Retrying {} for {:?} (attempt {}/{}) after transient error: {}, waiting {:?}",
                        operation,
                        key.map(|k| k.to_string()),
                        attempt + 1,
                        max_attempts,
                        message,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(SourceError::Transient(message)) | Err(SourceError::Fatal(message)) => {
                    tracing::error!(
                        "{} failed for {:?} after {} attempt(s): {}",
                        operation,
                        key.map(|k| k.to_string()),
                        attempt,
                        message
                    );
                    return Err(CompareError::fatal(
                        operation,
                        key.cloned(),
                        attempt,
                        message,
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
        assert_eq!(p.delay_for(10), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_recovers_from_transient() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = fast()
            .run("lookup", None, || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(SourceError::transient("timeout"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_escalates() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let key = Key::from("k");
        let result: Result<(), _> = fast()
            .run("lookup", Some(&key), || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(SourceError::transient("timeout"))
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(CompareError::FatalConnectivity { attempts, key, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(key, Some(Key::from("k")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = fast()
            .run("scan", None, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(SourceError::fatal("auth"))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
