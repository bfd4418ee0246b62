use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{ItemUpdate, NewTrackedItem, Subscriber, TrackedItem};
use crate::utils::error::StoreError;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Durable keyed storage for tracked items.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Items that are most overdue for a refresh: never refreshed first, then oldest
    /// `last_updated`, ties broken by key.
    async fn select_due(&self, limit: usize) -> Result<Vec<TrackedItem>, StoreError>;

    /// Write every reconciled field for `key`, creating the record if needed.
    /// `created_at` is only ever set on insert. Returns the stored record.
    async fn upsert(&self, key: &str, update: ItemUpdate) -> Result<TrackedItem, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<TrackedItem>, StoreError>;

    /// Start tracking an item. Tracking an existing key returns it unchanged.
    async fn track(&self, item: NewTrackedItem) -> Result<TrackedItem, StoreError>;

    /// Add a subscriber or update the target of an existing one.
    async fn subscribe(&self, key: &str, subscriber: Subscriber) -> Result<TrackedItem, StoreError>;
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    async fn select_due(&self, limit: usize) -> Result<Vec<TrackedItem>, StoreError> {
        (**self).select_due(limit).await
    }

    async fn upsert(&self, key: &str, update: ItemUpdate) -> Result<TrackedItem, StoreError> {
        (**self).upsert(key, update).await
    }

    async fn get(&self, key: &str) -> Result<Option<TrackedItem>, StoreError> {
        (**self).get(key).await
    }

    async fn track(&self, item: NewTrackedItem) -> Result<TrackedItem, StoreError> {
        (**self).track(item).await
    }

    async fn subscribe(&self, key: &str, subscriber: Subscriber) -> Result<TrackedItem, StoreError> {
        (**self).subscribe(key, subscriber).await
    }
}
