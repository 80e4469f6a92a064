//! The Orchestrator's HTTP surface (spec §4.3, §6): trigger a run over a
//! symbol universe, look up a past run by id. Grounded on `gateway_router`'s
//! axum wiring.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use crate::application::orchestrator::OrchestratorService;
use crate::domain::errors::AppError;
use crate::domain::orchestration::{OrchestrationRun, OrderMapping, RunStatus};
use crate::domain::ports::OrchestrationRunRepository;
use crate::infrastructure::observability::Metrics;

#[derive(Clone)]
pub struct OrchestratorState {
    pub service: Arc<OrchestratorService>,
    pub runs: Arc<dyn OrchestrationRunRepository>,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: OrchestratorState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/v1/orchestration/run", post(run))
        .route("/api/v1/orchestration/runs/{run_id}", get(get_run))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<OrchestratorState>) -> String {
    state.metrics.encode()
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    symbols: Vec<String>,
    capital: Decimal,
    max_position_size: Decimal,
    #[serde(default)]
    #[allow(dead_code)]
    as_of_date: Option<chrono::NaiveDate>,
}

async fn run(
    State(state): State<OrchestratorState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<OrchestrationRun>, AppError> {
    let run = state
        .service
        .run(&request.symbols, request.capital, request.max_position_size)
        .await?;
    let status_label = match run.status {
        RunStatus::Completed => "completed",
        RunStatus::Partial => "partial",
        RunStatus::Failed => "failed",
    };
    state.metrics.orchestration_runs_total.with_label_values(&[status_label]).inc();
    Ok(Json(run))
}

async fn get_run(
    State(state): State<OrchestratorState>,
    Path(run_id): Path<String>,
) -> Result<Json<OrchestrationRun>, AppError> {
    let row = state
        .runs
        .get(&run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(run_id))?;

    let status = match row.status.as_str() {
        "completed" => RunStatus::Completed,
        "partial" => RunStatus::Partial,
        "failed" => RunStatus::Failed,
        other => return Err(AppError::Internal(format!("unrecognized run status in storage: {other}"))),
    };
    let mappings: Vec<OrderMapping> =
        serde_json::from_str(&row.mappings).map_err(|e| AppError::Internal(format!("corrupt run mappings: {e}")))?;

    Ok(Json(OrchestrationRun {
        run_id: row.run_id,
        status,
        num_signals: row.num_signals as usize,
        num_orders_submitted: row.num_orders_submitted as usize,
        num_orders_accepted: row.num_orders_accepted as usize,
        num_orders_rejected: row.num_orders_rejected as usize,
        mappings,
        started_at: row.started_at,
        duration_seconds: row.duration_seconds,
    }))
}
