//! Swap API Routes
//!
//! JSON endpoints the UI uses to submit swaps and watch them settle,
//! plus the liveness, readiness and metrics probes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{error, info};

use crate::adapters::metrics::{HealthState, MetricsRegistry};
use crate::domain::error::SwapError;
use crate::domain::job::{LocalId, SwapJob, SwapRequest};
use crate::usecases::job_store::SwapJobStore;
use crate::usecases::monitor::SettlementMonitor;
use crate::usecases::submitter::SwapSubmitter;

/// Everything the handlers need.
#[derive(Clone)]
pub struct AppState {
  pub submitter: Arc<SwapSubmitter>,
  pub store: Arc<SwapJobStore>,
  pub monitor: SettlementMonitor,
  pub metrics: Arc<MetricsRegistry>,
  pub health: HealthState,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/swaps", post(submit_swap).get(list_swaps))
    .route("/swaps/:id", get(get_swap))
    .route("/swaps/:id/monitor", delete(stop_monitor))
    .route("/live", get(liveness))
    .route("/ready", get(readiness))
    .route("/metrics", get(metrics))
    .with_state(state)
}

#[derive(Debug, Serialize)]
struct Submitted {
  local_id: LocalId,
}

#[derive(Debug, Serialize)]
struct Stopped {
  stopped: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
  error: String,
}

/// Handler error carrying its HTTP status.
#[derive(Debug)]
pub struct ApiError {
  status: StatusCode,
  message: String,
}

impl ApiError {
  fn new(status: StatusCode, message: impl Into<String>) -> Self {
    Self {
      status,
      message: message.into(),
    }
  }

  pub fn status(&self) -> StatusCode {
    self.status
  }
}

impl From<SwapError> for ApiError {
  fn from(err: SwapError) -> Self {
    let status = match &err {
      SwapError::Validation(_) => StatusCode::BAD_REQUEST,
      SwapError::UnknownJob(_) => StatusCode::NOT_FOUND,
      SwapError::IllegalTransition { .. } => StatusCode::CONFLICT,
      SwapError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
      SwapError::SubmissionUnknown(_) => StatusCode::GATEWAY_TIMEOUT,
      _ => StatusCode::BAD_GATEWAY,
    };
    Self::new(status, err.to_string())
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status, Json(ErrorBody { error: self.message })).into_response()
  }
}

/// Look a job up by local id first, then by backend job id.
pub async fn resolve_job(store: &SwapJobStore, id: &str) -> Option<Arc<SwapJob>> {
  if let Ok(local_id) = id.parse::<LocalId>() {
    if let Some(job) = store.get(local_id).await {
      return Some(job);
    }
  }
  store.get_by_job_id(id).await
}

async fn submit_swap(
  State(state): State<AppState>,
  Json(request): Json<SwapRequest>,
) -> Result<impl IntoResponse, ApiError> {
  if !state.health.is_ready() {
    return Err(ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "shutting down"));
  }
  let local_id = state.submitter.submit(request)?;
  info!(local_id = %local_id, "Swap accepted");
  Ok((StatusCode::ACCEPTED, Json(Submitted { local_id })))
}

async fn list_swaps(State(state): State<AppState>) -> Json<Vec<SwapJob>> {
  Json(state.store.list().await.iter().map(|j| SwapJob::clone(j)).collect())
}

async fn get_swap(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<Json<SwapJob>, ApiError> {
  resolve_job(&state.store, &id)
    .await
    .map(|job| Json(SwapJob::clone(&job)))
    .ok_or_else(|| SwapError::UnknownJob(id).into())
}

async fn stop_monitor(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<Json<Stopped>, ApiError> {
  let job = resolve_job(&state.store, &id)
    .await
    .ok_or_else(|| SwapError::UnknownJob(id.clone()))?;
  let stopped = match &job.job_id {
    Some(job_id) => state.monitor.stop(job_id).await,
    None => false,
  };
  Ok(Json(Stopped { stopped }))
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> impl IntoResponse {
  (StatusCode::OK, "OK")
}

/// Readiness probe: 503 once shutdown started.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
  if state.health.is_ready() {
    (StatusCode::OK, "READY")
  } else {
    (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
  }
}

async fn metrics(State(state): State<AppState>) -> Response {
  match state.metrics.render() {
    Ok(body) => (StatusCode::OK, body).into_response(),
    Err(e) => {
      error!(error = %e, "Metrics encoding failed");
      StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
  }
}
