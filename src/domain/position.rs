//! Position snapshots. Always equal to broker truth after a successful
//! reconcile; updated incrementally by webhook fills between cycles.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub qty: i64,
    pub avg_entry_price: Decimal,
    pub last_reconciled_at: DateTime<Utc>,
}

impl PositionSnapshot {
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            qty: 0,
            avg_entry_price: Decimal::ZERO,
            last_reconciled_at: Utc::now(),
        }
    }
}
