//! Order ledger types.
//!
//! The order is the unit of truth the Execution Gateway owns. Every field
//! here round-trips through `sqlx` as TEXT/INTEGER columns (see
//! `infrastructure::persistence::order_repository`) the same way the
//! teacher's trade records do.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

impl std::str::FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            other => Err(format!("invalid order side: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "market"),
            OrderType::Limit => write!(f, "limit"),
        }
    }
}

impl std::str::FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            other => Err(format!("invalid order type: {other}")),
        }
    }
}

/// Order lifecycle. Forward-only per §4.2; terminal variants are
/// `Filled | Canceled | Rejected | Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    DryRun,
    Error,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Error
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Submitted => "submitted",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::DryRun => "dry_run",
            OrderStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => OrderStatus::Pending,
            "submitted" => OrderStatus::Submitted,
            "partially_filled" => OrderStatus::PartiallyFilled,
            "filled" => OrderStatus::Filled,
            "canceled" => OrderStatus::Canceled,
            "rejected" => OrderStatus::Rejected,
            "dry_run" => OrderStatus::DryRun,
            "error" => OrderStatus::Error,
            other => return Err(format!("invalid order status: {other}")),
        })
    }
}

/// Tie-breaker for concurrent CAS writers. Priority order (highest first):
/// webhook > reconciliation > internal timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    Webhook,
    Reconciliation,
    InternalTimer,
}

impl StatusSource {
    /// Higher wins a priority conflict.
    pub fn priority(self) -> u8 {
        match self {
            StatusSource::Webhook => 2,
            StatusSource::Reconciliation => 1,
            StatusSource::InternalTimer => 0,
        }
    }
}

impl fmt::Display for StatusSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusSource::Webhook => "webhook",
            StatusSource::Reconciliation => "reconciliation",
            StatusSource::InternalTimer => "internal_timer",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StatusSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "webhook" => StatusSource::Webhook,
            "reconciliation" => StatusSource::Reconciliation,
            "internal_timer" => StatusSource::InternalTimer,
            other => return Err(format!("invalid status source: {other}")),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub client_order_id: String,
    pub broker_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub qty: i64,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub time_in_force: String,
    pub status: OrderStatus,
    pub filled_qty: i64,
    pub avg_fill_price: Decimal,
    pub strategy_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_source: StatusSource,
    pub status_sequence: i64,
    pub trade_date: chrono::NaiveDate,
}

impl Order {
    pub fn qty_remaining(&self) -> i64 {
        (self.qty - self.filled_qty).max(0)
    }

    /// Signed reservation delta: positive for buy, negative for sell, of the
    /// quantity not yet terminalized.
    pub fn signed_remaining(&self) -> i64 {
        match self.side {
            OrderSide::Buy => self.qty_remaining(),
            OrderSide::Sell => -self.qty_remaining(),
        }
    }
}

/// Incoming order intent before a `client_order_id` is computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub qty: i64,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub time_in_force: Option<String>,
    pub strategy_id: Option<String>,
}
