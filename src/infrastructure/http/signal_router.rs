//! The Signal Service's HTTP surface (spec §6): ranked signal generation on
//! demand. Grounded on `gateway_router`'s axum wiring, applied to the single
//! `SignalGenerationService` entry point.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

use crate::application::signal_service::SignalGenerationService;
use crate::domain::errors::AppError;
use crate::domain::signal::Signal;
use crate::infrastructure::observability::Metrics;

#[derive(Clone)]
pub struct SignalState {
    pub service: Arc<SignalGenerationService>,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: SignalState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/v1/signals/generate", post(generate))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<SignalState>) -> String {
    state.metrics.encode()
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    symbols: Vec<String>,
    top_n: usize,
    bottom_n: usize,
}

async fn generate(
    State(state): State<SignalState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<Vec<Signal>>, AppError> {
    let signals = state
        .service
        .generate(&request.symbols, request.top_n, request.bottom_n)
        .await?;
    state.metrics.signals_generated_total.inc_by(signals.len() as u64);
    Ok(Json(signals))
}
