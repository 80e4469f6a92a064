//! Orchestration run records (spec §4.3, §6). Persisted before the
//! `/api/v1/orchestration/run` handler returns, so a crash mid-run still
//! leaves an accurate count of what was attempted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderMapping {
    pub symbol: String,
    pub order_qty: i64,
    pub order_price: Option<Decimal>,
    pub client_order_id: Option<String>,
    pub skip_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationRun {
    pub run_id: String,
    pub status: RunStatus,
    pub num_signals: usize,
    pub num_orders_submitted: usize,
    pub num_orders_accepted: usize,
    pub num_orders_rejected: usize,
    pub mappings: Vec<OrderMapping>,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
}
