use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;

use super::ObservationSource;
use crate::config::ScraperConfig;
use crate::models::Observation;
use crate::utils::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    /// Cap applied to every computed delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            initial_delay: Duration::from_millis(config.retry_delay_ms),
            backoff_multiplier: config.retry_backoff.max(1.0),
            max_delay: config.retry_max_delay(),
        }
    }

    /// Delays slept between consecutive attempts, each capped at `max_delay`.
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|i| {
                let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(i as i32);
                Duration::try_from_secs_f64(secs)
                    .map_or(self.max_delay, |delay| delay.min(self.max_delay))
            })
            .collect()
    }
}

/// Retries transient fetch failures. Exhaustion surfaces the last error unchanged.
pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: ObservationSource> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl<S: ObservationSource> ObservationSource for RetryingSource<S> {
    async fn fetch(&self, locator: &str) -> Result<Observation, FetchError> {
        let attempt = AtomicU32::new(0);
        let max_attempts = self.policy.max_attempts;

        RetryIf::spawn(
            self.policy.delays(),
            || {
                let current = attempt.fetch_add(1, Ordering::Relaxed) + 1;
                let attempt_future = self.inner.fetch(locator);
                async move {
                    let result = attempt_future.await;
                    if let Err(e) = &result {
                        tracing::debug!(locator, current, max_attempts, error = %e, "Fetch attempt failed");
                    }
                    result
                }
            },
            |e: &FetchError| e.is_transient(),
        )
        .await
    }
}
