//! Retry emitter with exponential backoff
//!
//! Wraps an output so transient send failures are retried before the
//! publisher sees a rejection.

use crate::backoff::BackoffConfig;
use async_trait::async_trait;
use mysqlbeat_core::{Emitter, Event, PluginError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Emitter wrapper that retries on failure with exponential backoff
pub struct RetryEmitter {
    inner: Arc<dyn Emitter>,
    config: BackoffConfig,
    /// Total retry attempts
    retry_count: AtomicU64,
    /// Emissions that succeeded after at least one failure
    recovered_count: AtomicU64,
}

impl RetryEmitter {
    pub fn new(inner: Arc<dyn Emitter>, config: BackoffConfig) -> Self {
        Self {
            inner,
            config,
            retry_count: AtomicU64::new(0),
            recovered_count: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(inner: Arc<dyn Emitter>) -> Self {
        Self::new(inner, BackoffConfig::default())
    }

    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub fn recovered_count(&self) -> u64 {
        self.recovered_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Emitter for RetryEmitter {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn emit(&self, events: &[Event]) -> Result<(), PluginError> {
        let output = self.inner.name();
        let source = events.first().map(Event::source).unwrap_or_default();
        let mut failure = None;

        for attempt in 0..=self.config.max_attempts {
            if attempt > 0 {
                let pause = self.config.delay_for_attempt(attempt);
                self.retry_count.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    output,
                    source,
                    attempt,
                    pause_ms = pause.as_millis() as u64,
                    "resending event"
                );
                tokio::time::sleep(pause).await;
            }

            match self.inner.emit(events).await {
                Ok(()) if attempt == 0 => return Ok(()),
                Ok(()) => {
                    self.recovered_count.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(output, source, attempt, "output accepted event after retry");
                    return Ok(());
                }
                // Resending cannot fix an event that does not encode
                Err(e @ PluginError::Encode(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        output,
                        source,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "output refused event"
                    );
                    failure = Some(e);
                }
            }
        }

        Err(failure.unwrap_or_else(|| PluginError::Send(format!("{output}: retries exhausted"))))
    }

    async fn health(&self) -> bool {
        self.inner.health().await
    }

    async fn shutdown(&self) -> Result<(), PluginError> {
        self.inner.shutdown().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Fails N times then succeeds
    struct FlakyEmitter {
        failures_left: AtomicU32,
        calls: AtomicU32,
        error: fn() -> PluginError,
    }

    impl FlakyEmitter {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
                error: || PluginError::Connection("simulated failure".into()),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Emitter for FlakyEmitter {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn emit(&self, _: &[Event]) -> Result<(), PluginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                Err((self.error)())
            } else {
                Ok(())
            }
        }

        async fn health(&self) -> bool {
            true
        }
    }

    fn fast_backoff() -> BackoffConfig {
        BackoffConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn event() -> Event {
        Event::builder("status", Utc::now())
            .field("Threads_connected", 5i64)
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_first_try() {
        let inner = Arc::new(FlakyEmitter::new(0));
        let retry = RetryEmitter::new(inner.clone(), fast_backoff());

        retry.emit(&[event()]).await.unwrap();

        assert_eq!(inner.calls(), 1);
        assert_eq!(retry.retry_count(), 0);
        assert_eq!(retry.recovered_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_from_transient_failure() {
        let inner = Arc::new(FlakyEmitter::new(2));
        let retry = RetryEmitter::new(inner.clone(), fast_backoff());

        retry.emit(&[event()]).await.unwrap();

        assert_eq!(inner.calls(), 3);
        assert_eq!(retry.retry_count(), 2);
        assert_eq!(retry.recovered_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted() {
        let inner = Arc::new(FlakyEmitter::new(10));
        let retry = RetryEmitter::new(inner.clone(), fast_backoff());

        assert!(retry.emit(&[event()]).await.is_err());
        assert_eq!(inner.calls(), 4);
        assert_eq!(retry.retry_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_encode_errors_not_retried() {
        let inner = Arc::new(FlakyEmitter {
            error: || PluginError::Encode("bad".into()),
            ..FlakyEmitter::new(1)
        });
        let retry = RetryEmitter::new(inner.clone(), fast_backoff());

        let err = retry.emit(&[event()]).await.unwrap_err();
        assert!(matches!(err, PluginError::Encode(_)));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_health_passthrough() {
        let retry = RetryEmitter::with_defaults(Arc::new(FlakyEmitter::new(0)));
        assert!(retry.health().await);
    }
}
