//! Wiring from configuration to a ready-to-run batch runner.

use std::sync::Arc;

use crate::config::{AppConfig, ScraperConfig, SmtpConfig};
use crate::notify::{EmailDispatcher, LogDispatcher, NotificationDispatcher};
use crate::refresher::BatchRefresher;
use crate::scheduler::BatchRunner;
use crate::sources::{HttpObservationSource, ObservationSource, RetryPolicy, RetryingSource, ThrottledSource};
use crate::store::{RecordStore, SqliteStore};
use crate::utils::error::AppError;
use crate::web::AppState;

pub struct App {
    pub config: AppConfig,
    pub store: Arc<dyn RecordStore>,
    pub runner: BatchRunner,
}

impl App {
    pub async fn build(config: AppConfig) -> Result<Self, AppError> {
        let store = SqliteStore::connect(&config.database).await?;
        Self::with_store(config, Arc::new(store))
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn RecordStore>) -> Result<Self, AppError> {
        let source = build_source(&config.scraper)?;
        let dispatcher = build_dispatcher(&config.notifications.smtp)?;
        Ok(Self::with_collaborators(config, store, source, dispatcher))
    }

    pub fn with_collaborators(
        config: AppConfig,
        store: Arc<dyn RecordStore>,
        source: Arc<dyn ObservationSource>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        let refresher = BatchRefresher::new(store.clone(), source, dispatcher)
            .with_concurrency(config.scraper.max_concurrent_checks);
        let runner = BatchRunner::new(Arc::new(refresher), &config.batch);

        Self {
            config,
            store,
            runner,
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            runner: self.runner.clone(),
            store: self.store.clone(),
        }
    }
}

/// HTTP fetches, spaced out, with retries on transient failures. Each retry
/// waits for its own throttle slot.
pub fn build_source(config: &ScraperConfig) -> Result<Arc<dyn ObservationSource>, AppError> {
    let http = HttpObservationSource::new(config)
        .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;
    let throttled = ThrottledSource::new(http, config.min_fetch_interval());
    let policy = RetryPolicy::from_config(config);

    tracing::debug!(
        min_interval_ms = config.min_fetch_interval_ms,
        max_attempts = policy.max_attempts,
        "Observation source configured"
    );
    Ok(Arc::new(RetryingSource::new(throttled, policy)))
}

pub fn build_dispatcher(config: &SmtpConfig) -> Result<Arc<dyn NotificationDispatcher>, AppError> {
    if config.is_enabled() {
        tracing::info!(host = %config.host, port = config.port, "Email notifications enabled");
        Ok(Arc::new(EmailDispatcher::new(config)?))
    } else {
        tracing::warn!("No SMTP host configured, notifications will only be logged");
        Ok(Arc::new(LogDispatcher))
    }
}
