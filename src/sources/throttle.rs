use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::ObservationSource;
use crate::models::Observation;
use crate::utils::error::FetchError;

/// Spaces out the start of consecutive fetches against a shared upstream.
///
/// Only the start times are serialized; fetches still overlap once started,
/// so concurrency is bounded by the caller, not here.
pub struct ThrottledSource<S> {
    inner: S,
    min_interval: Duration,
    next_slot: Mutex<Instant>,
}

impl<S: ObservationSource> ThrottledSource<S> {
    pub fn new(inner: S, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    async fn wait_for_slot(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = (*next_slot).max(now);
            *next_slot = slot + self.min_interval;
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}

#[async_trait]
impl<S: ObservationSource> ObservationSource for ThrottledSource<S> {
    async fn fetch(&self, locator: &str) -> Result<Observation, FetchError> {
        self.wait_for_slot().await;
        self.inner.fetch(locator).await
    }
}
