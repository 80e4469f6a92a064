//! The Execution Gateway's HTTP surface (spec §6): order submission,
//! lookup, listing, TWAP slicing, and broker webhook ingestion. Grounded on
//! the other example repos' axum router/state conventions — the teacher
//! carried no HTTP layer of its own, so this module is built fresh against
//! the `tower`/`axum` stack the workspace already depends on.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::application::execution_gateway::twap::TwapPlan;
use crate::application::execution_gateway::webhook::{verify_signature, WebhookHandler, WebhookPayload};
use crate::application::execution_gateway::ExecutionGatewayService;
use crate::application::risk::ReconciliationGateGuard;
use crate::domain::errors::AppError;
use crate::domain::order::{Order, OrderRequest, OrderSide, OrderStatus};
use crate::domain::ports::{OrderFilters, RiskStore};
use crate::infrastructure::observability::Metrics;

#[derive(Clone)]
pub struct GatewayState {
    pub service: Arc<ExecutionGatewayService>,
    pub webhook: Arc<WebhookHandler>,
    pub webhook_secret: Option<String>,
    pub dry_run: bool,
    pub risk_store: Arc<dyn RiskStore>,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/v1/orders", post(submit_order).get(list_orders))
        .route("/api/v1/orders/{client_order_id}", get(get_order))
        .route("/api/v1/orders/slice", post(submit_slice))
        .route("/api/v1/webhooks/broker", post(ingest_webhook))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    dry_run: bool,
    startup_gate: crate::domain::risk_state::ReconciliationGate,
    reconciliation_high_water_mark: chrono::DateTime<chrono::Utc>,
}

async fn health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let gate = ReconciliationGateGuard::new(state.risk_store.clone());
    Json(HealthResponse {
        status: "ok",
        dry_run: state.dry_run,
        startup_gate: gate.read().await,
        reconciliation_high_water_mark: gate.high_water_mark().await.unwrap_or(chrono::DateTime::UNIX_EPOCH),
    })
}

async fn metrics(State(state): State<GatewayState>) -> String {
    state.metrics.encode()
}

#[derive(Debug, Serialize)]
struct OrderResponse {
    client_order_id: String,
    status: OrderStatus,
    broker_order_id: Option<String>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        OrderResponse {
            client_order_id: order.client_order_id,
            status: order.status,
            broker_order_id: order.broker_order_id,
        }
    }
}

async fn submit_order(
    State(state): State<GatewayState>,
    Json(request): Json<OrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.service.submit_order(request).await?;
    state
        .metrics
        .orders_submitted_total
        .with_label_values(&[&order.status.to_string()])
        .inc();
    Ok(Json(order.into()))
}

async fn get_order(
    State(state): State<GatewayState>,
    Path(client_order_id): Path<String>,
) -> Result<Json<Order>, AppError> {
    state
        .service
        .get_order(&client_order_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(client_order_id))
}

#[derive(Debug, Deserialize)]
struct ListOrdersQuery {
    symbol: Option<String>,
    status: Option<String>,
    strategy_id: Option<String>,
    limit: Option<i64>,
}

async fn list_orders(
    State(state): State<GatewayState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(OrderStatus::from_str)
        .transpose()
        .map_err(AppError::Validation)?;

    let orders = state
        .service
        .list_orders(OrderFilters {
            symbol: query.symbol,
            status,
            strategy_id: query.strategy_id,
            limit: query.limit,
        })
        .await?;
    Ok(Json(orders))
}

#[derive(Debug, Deserialize)]
struct SliceRequest {
    symbol: String,
    side: OrderSide,
    total_qty: i64,
    num_slices: u32,
    start_time: chrono::DateTime<chrono::Utc>,
    end_time: chrono::DateTime<chrono::Utc>,
    strategy_id: Option<String>,
}

async fn submit_slice(
    State(state): State<GatewayState>,
    Json(request): Json<SliceRequest>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let plan = TwapPlan {
        parent_client_order_id: None,
        symbol: request.symbol,
        side: request.side,
        total_qty: request.total_qty,
        num_slices: request.num_slices,
        start_time: request.start_time,
        end_time: request.end_time,
        strategy_id: request.strategy_id,
    };

    let results = state.service.submit_plan(plan).await;
    let mut responses = Vec::with_capacity(results.len());
    for (client_order_id, result) in results {
        match result {
            Ok(order) => responses.push(order.into()),
            Err(_) => responses.push(OrderResponse {
                client_order_id,
                status: OrderStatus::Rejected,
                broker_order_id: None,
            }),
        }
    }
    Ok(Json(responses))
}

async fn ingest_webhook(
    State(state): State<GatewayState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Result<(), AppError> {
    let secret = state
        .webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::Internal("webhook secret not configured".into()))?;

    let signature = headers
        .get("X-Webhook-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("missing X-Webhook-Signature header".into()))?;

    if !verify_signature(secret, &body, signature) {
        state.metrics.webhook_events_total.with_label_values(&["bad_signature"]).inc();
        return Err(AppError::Validation("invalid webhook signature".into()));
    }

    let payload: WebhookPayload =
        serde_json::from_slice(&body).map_err(|e| AppError::Validation(format!("malformed webhook body: {e}")))?;

    let result = state.webhook.apply(payload).await;
    state
        .metrics
        .webhook_events_total
        .with_label_values(&[if result.is_ok() { "applied" } else { "rejected" }])
        .inc();
    result
}
