//! Append-only fill records. `Σ fills.qty == order.filled_qty` at all times.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: String,
    pub client_order_id: String,
    pub qty: i64,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Folds a new fill into a running weighted-average fill price, the way the
/// webhook handler updates `avg_fill_price` on each delivery.
pub fn weighted_avg_price(
    prior_qty: i64,
    prior_avg: Decimal,
    new_qty: i64,
    new_price: Decimal,
) -> Decimal {
    let total_qty = prior_qty + new_qty;
    if total_qty == 0 {
        return Decimal::ZERO;
    }
    ((prior_avg * Decimal::from(prior_qty)) + (new_price * Decimal::from(new_qty)))
        / Decimal::from(total_qty)
}
