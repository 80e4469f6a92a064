//! Position reservation (spec §4.4): an atomic per-symbol counter of
//! submitted-but-not-terminalized quantity, added to the position snapshot
//! for limit checks. Grounded on `order_reconciler.rs`'s TTL-released
//! `PendingOrder` bookkeeping, flattened to a single `RiskStore` counter per
//! symbol since the conservation invariant (`reserved == Σ non-terminal
//! qty_remaining`) only needs a running total, not per-order tokens.

use crate::domain::errors::AppError;
use crate::domain::ports::RiskStore;
use std::sync::Arc;
use tracing::warn;

use super::reservation_key;

pub struct ReservationLedger {
    store: Arc<dyn RiskStore>,
}

impl ReservationLedger {
    pub fn new(store: Arc<dyn RiskStore>) -> Self {
        Self { store }
    }

    pub async fn current(&self, symbol: &str) -> Result<i64, AppError> {
        match self.store.get(&reservation_key(symbol)).await? {
            Some(value) => value
                .parse()
                .map_err(|_| AppError::Internal(format!("corrupt reservation counter for {symbol}"))),
            None => Ok(0),
        }
    }

    /// Adds `signed_qty` (positive for buys, negative for sells) to the
    /// symbol's running reservation and returns the new total.
    pub async fn reserve(&self, symbol: &str, signed_qty: i64) -> Result<i64, AppError> {
        self.store.atomic_add(&reservation_key(symbol), signed_qty).await
    }

    /// Releases a previously reserved amount on order terminalization or
    /// TTL expiry. Logs rather than panicking if this drives the counter
    /// negative, which would indicate a conservation-invariant violation
    /// elsewhere.
    pub async fn release(&self, symbol: &str, signed_qty: i64) -> Result<i64, AppError> {
        let next = self.store.atomic_add(&reservation_key(symbol), -signed_qty).await?;
        if next < 0 {
            warn!(symbol, next, "reservation counter went negative on release");
        }
        Ok(next)
    }
}
