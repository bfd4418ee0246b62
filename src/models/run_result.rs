use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::NotificationKind;
use crate::models::TrackedItem;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemFailure {
    pub key: String,
    pub stage: String,
    pub error: String,
}

/// A problem that did not stop the item from being persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemWarning {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentNotification {
    pub key: String,
    pub kind: NotificationKind,
    pub recipients: usize,
}

/// Summary of one batch invocation. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated: Vec<TrackedItem>,
    pub failures: Vec<ItemFailure>,
    pub warnings: Vec<ItemWarning>,
    pub notifications: Vec<SentNotification>,
}

impl RunResult {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: None,
            updated: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
            notifications: Vec::new(),
        }
    }

    pub fn finish(mut self, finished_at: DateTime<Utc>) -> Self {
        self.finished_at = Some(finished_at);
        self
    }

    /// True when the batch selected nothing.
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.failures.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.updated.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn processed_count(&self) -> usize {
        self.updated.len() + self.failures.len()
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.key.as_str()).collect()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_milliseconds())
    }
}
