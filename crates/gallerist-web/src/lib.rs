//! Axum operator API: health snapshot, scheduler status and manual job triggers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gallerist_sync::{ExecutionOutcome, HealthMonitor, Scheduler, SchedulerError};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const CRATE_NAME: &str = "gallerist-web";

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
    pub health: Arc<HealthMonitor>,
}

impl AppState {
    pub fn new(scheduler: Scheduler, health: Arc<HealthMonitor>) -> Self {
        Self { scheduler, health }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/jobs/{name}/run", post(run_job_handler))
        .with_state(Arc::new(state))
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(state: AppState, port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "operator api listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.health.snapshot().await;
    let status = if snapshot.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(snapshot)).into_response()
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.scheduler.status()).into_response()
}

async fn run_job_handler(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.scheduler.run_task_manually(&name).await {
        Ok(outcome) => {
            let status = match outcome {
                ExecutionOutcome::Skipped { .. } => StatusCode::CONFLICT,
                _ => StatusCode::OK,
            };
            let body = json!({
                "job": name,
                "result": outcome,
                "stats": state.scheduler.stats(&name),
            });
            (status, Json(body)).into_response()
        }
        Err(err @ SchedulerError::UnknownJob(_)) => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": err.to_string() }))).into_response()
        }
        Err(err) => server_error(err.into()),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("{err:#}") })),
    )
        .into_response()
}
