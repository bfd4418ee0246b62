//! Process-local store for development and tests. Nothing survives a restart.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::RecordStore;
use crate::models::{ItemUpdate, NewTrackedItem, Subscriber, TrackedItem};
use crate::utils::error::StoreError;

#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<HashMap<String, TrackedItem>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = TrackedItem>) -> Self {
        let items = items
            .into_iter()
            .map(|item| (item.key.clone(), item))
            .collect();
        Self {
            items: RwLock::new(items),
        }
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn select_due(&self, limit: usize) -> Result<Vec<TrackedItem>, StoreError> {
        let items = self.items.read().await;
        let mut due: Vec<&TrackedItem> = items.values().collect();
        // None sorts before Some, which puts never-refreshed items first
        due.sort_by(|a, b| {
            a.last_updated
                .cmp(&b.last_updated)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(due.into_iter().take(limit).cloned().collect())
    }

    async fn upsert(&self, key: &str, update: ItemUpdate) -> Result<TrackedItem, StoreError> {
        let update = update.normalized();
        let mut items = self.items.write().await;

        let item = items.entry(key.to_string()).or_insert_with(|| {
            TrackedItem::new(
                NewTrackedItem {
                    key: key.to_string(),
                    title: None,
                },
                Utc::now(),
            )
        });

        if update.price_history.len() < item.price_history.len() {
            return Err(StoreError::HistoryRegression {
                key: key.to_string(),
                stored: item.price_history.len(),
                proposed: update.price_history.len(),
            });
        }
        if let Some(position) = item
            .price_history
            .iter()
            .zip(&update.price_history)
            .position(|(stored, proposed)| stored != proposed)
        {
            return Err(StoreError::HistoryDiverged {
                key: key.to_string(),
                position,
            });
        }

        item.apply(update);
        Ok(item.clone())
    }

    async fn get(&self, key: &str) -> Result<Option<TrackedItem>, StoreError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn track(&self, item: NewTrackedItem) -> Result<TrackedItem, StoreError> {
        let mut items = self.items.write().await;
        let stored = items
            .entry(item.key.clone())
            .or_insert_with(|| TrackedItem::new(item, Utc::now()));
        Ok(stored.clone())
    }

    async fn subscribe(&self, key: &str, subscriber: Subscriber) -> Result<TrackedItem, StoreError> {
        let mut items = self.items.write().await;
        let item = items.get_mut(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;
        item.add_subscriber(subscriber);
        Ok(item.clone())
    }
}
