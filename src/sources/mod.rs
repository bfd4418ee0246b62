use async_trait::async_trait;
use std::sync::Arc;

use crate::models::Observation;
use crate::utils::error::FetchError;

pub mod html;
pub mod price;
pub mod retry;
pub mod throttle;

pub use html::{HtmlSelectors, HttpObservationSource};
pub use price::PriceParser;
pub use retry::{RetryPolicy, RetryingSource};
pub use throttle::ThrottledSource;

/// Fetches a fresh observation for an item locator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Observation, FetchError>;
}

#[async_trait]
impl<S: ObservationSource + ?Sized> ObservationSource for Arc<S> {
    async fn fetch(&self, locator: &str) -> Result<Observation, FetchError> {
        (**self).fetch(locator).await
    }
}
