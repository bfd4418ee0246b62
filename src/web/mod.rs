use axum::{routing::get, Router};
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::ServerConfig;
use crate::scheduler::BatchRunner;
use crate::store::RecordStore;
use crate::utils::error::AppError;

pub mod handlers;
pub mod responses;

pub use responses::{ApiError, ApiResponse, ErrorBody, HealthResponse};

#[derive(Clone)]
pub struct AppState {
    pub runner: BatchRunner,
    pub store: Arc<dyn RecordStore>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/cron", get(handlers::run_cron))
        .route("/api/runs/stats", get(handlers::run_stats))
        .route("/api/items", get(handlers::get_item).post(handlers::track_item))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn serve(
    config: &ServerConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AppError> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;

    tracing::info!(host = %config.host, port = config.port, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
