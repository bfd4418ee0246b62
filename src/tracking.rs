//! Subscription flow: start tracking a product page and optionally subscribe to it.

use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::models::{NewTrackedItem, Subscriber, TrackedItem};
use crate::store::RecordStore;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrackRequest {
    #[validate(url(message = "url must be an absolute http(s) address"))]
    pub url: String,
    pub title: Option<String>,
    #[validate(email(message = "email is not a valid address"))]
    pub email: Option<String>,
    #[validate(range(exclusive_min = 0.0, message = "target price must be positive"))]
    pub target_price: Option<f64>,
}

/// Canonical form of a product URL, used as the item key.
pub fn canonical_key(raw: &str) -> Result<String, AppError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| AppError::Validation(format!("invalid url '{}': {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::Validation(format!(
            "unsupported url scheme '{}'",
            url.scheme()
        )));
    }
    url.set_fragment(None);
    Ok(url.to_string())
}

pub async fn track(store: &dyn RecordStore, request: TrackRequest) -> Result<TrackedItem, AppError> {
    request.validate()?;
    if request.target_price.is_some() && request.email.is_none() {
        return Err(AppError::Validation(
            "a target price needs an email to notify".to_string(),
        ));
    }

    let key = canonical_key(&request.url)?;
    let mut item = store
        .track(NewTrackedItem {
            key: key.clone(),
            title: request.title,
        })
        .await?;

    if let Some(email) = request.email {
        let subscriber = Subscriber {
            email,
            target_price: request.target_price,
        };
        subscriber.validate()?;
        item = store.subscribe(&key, subscriber).await?;
    }

    tracing::info!(key = %item.key, subscribers = item.subscribers.len(), "Item tracked");
    Ok(item)
}
