//! TWAP slicing (spec §4.2, §6 `POST /api/v1/orders/slice`): splits a total
//! quantity into `num_slices` child orders, each submitted through the same
//! `submit_order` path so they get the same idempotency and gate coverage
//! as a manually-placed order.

use crate::domain::client_order_id::slice_id;
use crate::domain::order::{OrderRequest, OrderSide, OrderType};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct TwapPlan {
    pub parent_client_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub total_qty: i64,
    pub num_slices: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub strategy_id: Option<String>,
}

/// Splits `total_qty` into `num_slices` as evenly as possible; any
/// remainder from integer division lands on the final slice so
/// `Σ slice.qty == total_qty` exactly.
pub fn slice_quantities(total_qty: i64, num_slices: u32) -> Vec<i64> {
    if num_slices == 0 {
        return Vec::new();
    }
    let n = num_slices as i64;
    let base = total_qty / n;
    let remainder = total_qty % n;
    (0..n)
        .map(|i| if i == n - 1 { base + remainder } else { base })
        .collect()
}

/// Builds the child order requests for a plan. Limit price is left unset —
/// TWAP slices submit as market orders, matching the teacher's execution
/// scheduler which never attaches a limit to a sliced child.
pub fn build_slices(plan: &TwapPlan) -> Vec<(String, OrderRequest)> {
    let parent_id = plan.parent_client_order_id.clone().unwrap_or_else(|| {
        crate::domain::client_order_id::compute(
            &plan.symbol,
            &plan.side.to_string(),
            plan.total_qty,
            None,
            plan.strategy_id.as_deref(),
            Utc::now().date_naive(),
        )
    });

    slice_quantities(plan.total_qty, plan.num_slices)
        .into_iter()
        .enumerate()
        .filter(|(_, qty)| *qty != 0)
        .map(|(idx, qty)| {
            let child_id = slice_id(&parent_id, idx as u32);
            let request = OrderRequest {
                symbol: plan.symbol.clone(),
                side: plan.side,
                qty,
                order_type: OrderType::Market,
                limit_price: None,
                time_in_force: None,
                strategy_id: plan.strategy_id.clone(),
            };
            (child_id, request)
        })
        .collect()
}
