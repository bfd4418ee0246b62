use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResponse, AppState, HealthResponse};
use crate::models::{RunResult, TrackedItem};
use crate::scheduler::RunStats;
use crate::tracking::{self, TrackRequest};

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemQuery {
    pub key: String,
}

/// Trigger a batch run and report its result.
pub async fn run_cron(State(state): State<AppState>) -> Result<Json<ApiResponse<RunResult>>, ApiError> {
    match state.runner.run().await {
        Ok(result) => Ok(Json(ApiResponse::ok(result))),
        Err(e) => {
            tracing::error!(error = %e, "Batch run via HTTP failed");
            // Every run-level failure is reported as a 500, including an overlapping run
            Err(ApiError::Internal(e.to_string()))
        }
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.runner.stats().await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: stats.uptime_seconds,
        batch_running: stats.running,
        last_run_at: stats.last_run_at,
    })
}

pub async fn run_stats(State(state): State<AppState>) -> Json<ApiResponse<RunStats>> {
    let stats = state.runner.stats().await;
    tracing::debug!(total_runs = stats.total_runs, "Retrieved run stats");
    Json(ApiResponse::ok(stats))
}

pub async fn track_item(
    State(state): State<AppState>,
    Json(request): Json<TrackRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TrackedItem>>), ApiError> {
    let item = tracking::track(state.store.as_ref(), request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(item))))
}

pub async fn get_item(
    State(state): State<AppState>,
    Query(query): Query<ItemQuery>,
) -> Result<Json<ApiResponse<TrackedItem>>, ApiError> {
    let key = tracking::canonical_key(&query.key)?;
    let item = state
        .store
        .get(&key)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("{} not found", key)))?;
    Ok(Json(ApiResponse::ok(item)))
}
