use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::BatchConfig;
use crate::models::RunResult;
use crate::refresher::BatchRefresher;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// Triggers refused because a run was already in flight.
    pub skipped_runs: u64,
    pub items_refreshed: u64,
    pub item_failures: u64,
    pub notifications_sent: u64,
    pub average_run_time_ms: f64,
    pub last_run_id: Option<Uuid>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub running: bool,
    pub uptime_seconds: u64,
}

#[derive(Debug, Default)]
struct StatsState {
    total_runs: u64,
    successful_runs: u64,
    failed_runs: u64,
    skipped_runs: u64,
    items_refreshed: u64,
    item_failures: u64,
    notifications_sent: u64,
    total_run_time_ms: u128,
    last_run_id: Option<Uuid>,
    last_run_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Runs one batch at a time with a deadline. Shared by every trigger.
#[derive(Clone)]
pub struct BatchRunner {
    refresher: Arc<BatchRefresher>,
    batch_size: usize,
    run_timeout: Duration,
    in_flight: Arc<Mutex<()>>,
    stats: Arc<RwLock<StatsState>>,
    start_time: DateTime<Utc>,
}

impl BatchRunner {
    pub fn new(refresher: Arc<BatchRefresher>, config: &BatchConfig) -> Self {
        Self {
            refresher,
            batch_size: config.batch_size,
            run_timeout: config.run_timeout(),
            in_flight: Arc::new(Mutex::new(())),
            stats: Arc::new(RwLock::new(StatsState::default())),
            start_time: Utc::now(),
        }
    }

    pub fn refresher(&self) -> &Arc<BatchRefresher> {
        &self.refresher
    }

    /// Run a batch now. Refuses with `AppError::Busy` if one is already running.
    /// Items persisted before a timeout stay persisted.
    pub async fn run(&self) -> Result<RunResult, AppError> {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.stats.write().await.skipped_runs += 1;
                return Err(AppError::Busy);
            }
        };

        let started = tokio::time::Instant::now();
        let outcome = match tokio::time::timeout(self.run_timeout, self.refresher.run_batch(self.batch_size)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AppError::Timeout {
                seconds: self.run_timeout.as_secs(),
            }),
        };
        self.record(&outcome, started.elapsed()).await;

        outcome
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    pub async fn stats(&self) -> RunStats {
        let stats = self.stats.read().await;
        let finished = stats.successful_runs + stats.failed_runs;
        let average_run_time_ms = if finished == 0 {
            0.0
        } else {
            stats.total_run_time_ms as f64 / finished as f64
        };
        let uptime = Utc::now().signed_duration_since(self.start_time);

        RunStats {
            total_runs: stats.total_runs,
            successful_runs: stats.successful_runs,
            failed_runs: stats.failed_runs,
            skipped_runs: stats.skipped_runs,
            items_refreshed: stats.items_refreshed,
            item_failures: stats.item_failures,
            notifications_sent: stats.notifications_sent,
            average_run_time_ms,
            last_run_id: stats.last_run_id,
            last_run_at: stats.last_run_at,
            last_error: stats.last_error.clone(),
            running: self.is_running(),
            uptime_seconds: uptime.num_seconds().max(0) as u64,
        }
    }

    async fn record(&self, outcome: &Result<RunResult, AppError>, elapsed: Duration) {
        let mut stats = self.stats.write().await;
        stats.total_runs += 1;
        stats.total_run_time_ms += elapsed.as_millis();
        stats.last_run_at = Some(Utc::now());

        match outcome {
            Ok(result) => {
                stats.successful_runs += 1;
                stats.items_refreshed += result.success_count() as u64;
                stats.item_failures += result.failure_count() as u64;
                stats.notifications_sent += result.notifications.len() as u64;
                stats.last_run_id = Some(result.run_id);
                stats.last_error = None;
            }
            Err(e) => {
                stats.failed_runs += 1;
                stats.last_error = Some(e.to_string());
            }
        }
    }
}

/// Fires the batch runner on a cron schedule.
pub struct BatchScheduler {
    scheduler: JobScheduler,
    runner: BatchRunner,
    schedule: String,
    job_id: Option<Uuid>,
}

impl BatchScheduler {
    pub async fn new(runner: BatchRunner, schedule: impl Into<String>) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            runner,
            schedule: schedule.into(),
            job_id: None,
        })
    }

    pub fn runner(&self) -> &BatchRunner {
        &self.runner
    }

    pub fn job_id(&self) -> Option<Uuid> {
        self.job_id
    }

    pub async fn start(&mut self) -> Result<(), AppError> {
        let runner = self.runner.clone();

        let job = Job::new_async(self.schedule.as_str(), move |_uuid, _l| {
            let runner = runner.clone();
            Box::pin(async move {
                match runner.run().await {
                    Ok(result) => tracing::debug!(
                        run_id = %result.run_id,
                        updated = result.success_count(),
                        failed = result.failure_count(),
                        "Scheduled batch run completed"
                    ),
                    Err(AppError::Busy) => {
                        tracing::warn!("Previous batch run still in progress, skipping this tick")
                    }
                    Err(e) => tracing::error!(error = %e, "Scheduled batch run failed"),
                }
            })
        })?;

        self.job_id = Some(self.scheduler.add(job).await?);
        self.scheduler.start().await?;
        tracing::info!(schedule = %self.schedule, "Batch scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler.shutdown().await?;
        tracing::info!("Batch scheduler shutdown");
        Ok(())
    }
}
