//! Batch refresh: select overdue items, observe them, fold the observation into
//! history, notify subscribers and persist.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::classifier::{self, NotificationKind, PriceState};
use crate::history;
use crate::models::{
    ItemFailure, ItemUpdate, ItemWarning, Observation, RunResult, SentNotification, TrackedItem,
};
use crate::notify::{self, NotificationDispatcher};
use crate::sources::ObservationSource;
use crate::store::RecordStore;
use crate::utils::error::{AppError, ItemError};

/// Everything one item's pass decided, before anything is sent or written.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub update: ItemUpdate,
    pub kind: Option<NotificationKind>,
    /// Subscribers eligible for `kind`. Empty when nothing should be sent.
    pub recipients: Vec<String>,
}

/// Fold `observation` into `item` and classify the transition. Pure.
pub fn reconcile(item: &TrackedItem, observation: &Observation, now: DateTime<Utc>) -> Reconciliation {
    let folded = history::fold(&item.price_history, observation, now);

    let update = ItemUpdate {
        title: observation.title.clone(),
        attributes: observation.attributes.clone(),
        current_price: folded.current_price(),
        lowest_price: folded.stats.map(|s| s.lowest),
        highest_price: folded.stats.map(|s| s.highest),
        average_price: folded.stats.map(|s| s.average),
        is_out_of_stock: folded.is_out_of_stock(),
        price_history: folded.history,
        last_updated: now,
    };

    let previous = item.price_state();
    let next = PriceState {
        current_price: update.current_price,
        is_out_of_stock: update.is_out_of_stock,
        lowest_price: update.lowest_price,
    };

    let kind = classifier::classify(&previous, &next, &item.target_prices());
    let recipients = match kind {
        Some(NotificationKind::ThresholdMet) => item
            .subscribers
            .iter()
            .filter(|s| {
                s.target_price
                    .is_some_and(|target| classifier::crossed_target(&previous, &next, target))
            })
            .map(|s| s.email.clone())
            .collect(),
        Some(_) => item.subscriber_emails(),
        None => Vec::new(),
    };

    Reconciliation {
        update,
        kind,
        recipients,
    }
}

struct ItemOutcome {
    key: String,
    result: Result<TrackedItem, ItemError>,
    notification: Option<SentNotification>,
    warning: Option<ItemWarning>,
}

pub struct BatchRefresher {
    store: Arc<dyn RecordStore>,
    source: Arc<dyn ObservationSource>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    concurrency: usize,
}

impl BatchRefresher {
    pub fn new(
        store: Arc<dyn RecordStore>,
        source: Arc<dyn ObservationSource>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            source,
            dispatcher,
            concurrency: 1,
        }
    }

    /// Items fetched at once. Results are still reported in selection order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Refresh up to `max_items` overdue items. Only a failed selection fails the run;
    /// per-item problems are reported in the result.
    #[tracing::instrument(skip(self), fields(run_id))]
    pub async fn run_batch(&self, max_items: usize) -> Result<RunResult, AppError> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let mut result = RunResult::new(run_id, Utc::now());

        let selected = self
            .store
            .select_due(max_items)
            .await
            .map_err(AppError::Selection)?;

        let mut seen = HashSet::new();
        let items: Vec<TrackedItem> = selected
            .into_iter()
            .filter(|item| seen.insert(item.key.clone()))
            .collect();
        tracing::debug!(selected = items.len(), max_items, "Selected items for refresh");

        let outcomes: Vec<ItemOutcome> = stream::iter(items)
            .map(|item| self.refresh_item(item))
            .buffered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            if let Some(notification) = outcome.notification {
                metrics::counter!("pricewatch_notifications_total", "kind" => notification.kind.as_str())
                    .increment(1);
                result.notifications.push(notification);
            }
            if let Some(warning) = outcome.warning {
                result.warnings.push(warning);
            }

            match outcome.result {
                Ok(item) => {
                    metrics::counter!("pricewatch_items_refreshed_total").increment(1);
                    result.updated.push(item);
                }
                Err(e) => {
                    tracing::warn!(key = %outcome.key, stage = e.stage(), error = %e, "Item refresh failed");
                    metrics::counter!("pricewatch_item_failures_total", "stage" => e.stage()).increment(1);
                    result.failures.push(ItemFailure {
                        key: outcome.key,
                        stage: e.stage().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let result = result.finish(Utc::now());
        metrics::counter!("pricewatch_runs_total").increment(1);
        tracing::info!(
            updated = result.success_count(),
            failed = result.failure_count(),
            warnings = result.warnings.len(),
            notifications = result.notifications.len(),
            duration_ms = result.duration_ms().unwrap_or_default(),
            "Batch run finished"
        );
        Ok(result)
    }

    #[tracing::instrument(level = "debug", skip(self, item), fields(key = %item.key))]
    async fn refresh_item(&self, item: TrackedItem) -> ItemOutcome {
        let key = item.key.clone();

        let observation = match self.source.fetch(&key).await {
            Ok(observation) => observation,
            Err(e) => {
                return ItemOutcome {
                    key,
                    result: Err(e.into()),
                    notification: None,
                    warning: None,
                };
            }
        };

        let reconciliation = reconcile(&item, &observation, Utc::now());
        tracing::debug!(
            price = ?reconciliation.update.current_price,
            out_of_stock = reconciliation.update.is_out_of_stock,
            kind = ?reconciliation.kind,
            "Reconciled observation"
        );

        let (notification, warning) = match reconciliation.kind {
            Some(kind) if !reconciliation.recipients.is_empty() => {
                self.notify(&item, kind, &reconciliation).await
            }
            _ => (None, None),
        };

        let result = self
            .store
            .upsert(&key, reconciliation.update)
            .await
            .map_err(ItemError::from);

        ItemOutcome {
            key,
            result,
            notification,
            warning,
        }
    }

    /// A failed send is downgraded to a warning so the item is still persisted.
    async fn notify(
        &self,
        item: &TrackedItem,
        kind: NotificationKind,
        reconciliation: &Reconciliation,
    ) -> (Option<SentNotification>, Option<ItemWarning>) {
        let mut preview = item.clone();
        preview.apply(reconciliation.update.clone().normalized());
        let content = notify::render(kind, &preview);

        match self
            .dispatcher
            .send(&reconciliation.recipients, &content.subject, &content.body)
            .await
        {
            Ok(()) => {
                let sent = SentNotification {
                    key: item.key.clone(),
                    kind,
                    recipients: reconciliation.recipients.len(),
                };
                (Some(sent), None)
            }
            Err(e) => {
                tracing::warn!(key = %item.key, kind = kind.as_str(), error = %e, "Notification dispatch failed");
                let warning = ItemWarning {
                    key: item.key.clone(),
                    error: e.to_string(),
                };
                (None, Some(warning))
            }
        }
    }
}
