// Shared fixtures for the integration tests

pub mod batch_run_tests;
pub mod http_source_tests;
pub mod store_tests;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use pricewatch::config::{AppConfig, DatabaseConfig};
use pricewatch::models::{ItemAttributes, Observation, TrackedItem};
use pricewatch::notify::NotificationDispatcher;
use pricewatch::sources::ObservationSource;
use pricewatch::store::SqliteStore;
use pricewatch::tracking::{self, TrackRequest};
use pricewatch::utils::error::{DispatchError, FetchError};
use pricewatch::web::{create_router, AppState};
use pricewatch::{App, BatchRunner};

/// Test configuration for integration tests
pub fn get_test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.database = memory_database();
    config.scraper.max_concurrent_checks = 2;
    config.scraper.min_fetch_interval_ms = 0;
    config.scraper.retry_delay_ms = 10;
    config.batch.run_timeout_secs = 30;
    config
}

pub fn memory_database() -> DatabaseConfig {
    DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        ..DatabaseConfig::default()
    }
}

pub async fn memory_store() -> anyhow::Result<Arc<SqliteStore>> {
    Ok(Arc::new(SqliteStore::connect(&memory_database()).await?))
}

/// One scripted answer from [`ScriptedSource`].
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Price(f64),
    OutOfStock,
    Status(u16),
}

/// Observation source that replays a per-locator script. The last step repeats.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn script(self, locator: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(locator.to_string(), steps.into_iter().collect());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next_step(&self, locator: &str) -> Option<Step> {
        let mut scripts = self.scripts.lock().unwrap();
        let steps = scripts.get_mut(locator)?;
        if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().copied()
        }
    }
}

pub fn observation(title: &str, price: Option<f64>, is_out_of_stock: bool) -> Observation {
    Observation {
        title: title.to_string(),
        current_price: price,
        is_out_of_stock,
        attributes: ItemAttributes {
            currency: Some("USD".to_string()),
            ..ItemAttributes::default()
        },
    }
}

#[async_trait]
impl ObservationSource for ScriptedSource {
    async fn fetch(&self, locator: &str) -> Result<Observation, FetchError> {
        self.calls.lock().unwrap().push(locator.to_string());
        match self.next_step(locator) {
            Some(Step::Price(price)) => Ok(observation("Test Product", Some(price), false)),
            Some(Step::OutOfStock) => Ok(observation("Test Product", None, true)),
            Some(Step::Status(status)) => Err(FetchError::Status {
                locator: locator.to_string(),
                status,
            }),
            None => Err(FetchError::InvalidLocator(format!("unscripted locator {}", locator))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Dispatcher that keeps every message it was asked to send.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<SentMessage>>,
    fail: bool,
}

impl RecordingDispatcher {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), DispatchError> {
        if self.fail {
            return Err(DispatchError::Transport("relay refused connection".to_string()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            recipients: recipients.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// A fully wired application over an in-memory SQLite store.
pub struct TestHarness {
    pub app: App,
    pub store: Arc<SqliteStore>,
    pub source: Arc<ScriptedSource>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

impl TestHarness {
    pub async fn new(source: ScriptedSource) -> anyhow::Result<Self> {
        Self::with_dispatcher(source, RecordingDispatcher::default()).await
    }

    pub async fn with_dispatcher(
        source: ScriptedSource,
        dispatcher: RecordingDispatcher,
    ) -> anyhow::Result<Self> {
        let store = memory_store().await?;
        let source = Arc::new(source);
        let dispatcher = Arc::new(dispatcher);
        let app = App::with_collaborators(
            get_test_config(),
            store.clone(),
            source.clone(),
            dispatcher.clone(),
        );

        Ok(Self {
            app,
            store,
            source,
            dispatcher,
        })
    }

    pub fn runner(&self) -> &BatchRunner {
        &self.app.runner
    }

    pub fn router(&self) -> axum::Router {
        create_router(self.state())
    }

    pub fn state(&self) -> AppState {
        self.app.state()
    }

    /// Track `url`, optionally subscribing an email with a target price.
    pub async fn track(&self, url: &str, subscriber: Option<(&str, f64)>) -> anyhow::Result<TrackedItem> {
        let request = TrackRequest {
            url: url.to_string(),
            title: Some("Test Product".to_string()),
            email: subscriber.map(|(email, _)| email.to_string()),
            target_price: subscriber.map(|(_, target)| target),
        };
        Ok(tracking::track(self.store.as_ref(), request).await?)
    }
}
