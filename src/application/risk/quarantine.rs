//! Per-symbol reduce-only quarantine (spec §4.4): set when reconciliation
//! finds an orphaned broker order or a position mismatch it can't resolve
//! automatically. While quarantined a symbol accepts only orders that
//! reduce the existing position.

use crate::domain::errors::AppError;
use crate::domain::ports::RiskStore;
use std::sync::Arc;
use tracing::warn;

use super::quarantine_key;

pub struct QuarantineGuard {
    store: Arc<dyn RiskStore>,
}

impl QuarantineGuard {
    pub fn new(store: Arc<dyn RiskStore>) -> Self {
        Self { store }
    }

    /// Fails closed: an unreadable store reads as quarantined.
    pub async fn is_quarantined(&self, symbol: &str) -> bool {
        match self.store.get(&quarantine_key(symbol)).await {
            Ok(Some(value)) => value == "true",
            Ok(None) => false,
            Err(err) => {
                warn!(%err, symbol, "quarantine flag unreadable, failing closed");
                true
            }
        }
    }

    pub async fn quarantine(&self, symbol: &str, reason: &str) -> Result<(), AppError> {
        self.store.set(&quarantine_key(symbol), "true").await?;
        warn!(symbol, reason, "symbol quarantined to reduce-only");
        Ok(())
    }

    pub async fn clear(&self, symbol: &str) -> Result<(), AppError> {
        self.store.delete(&quarantine_key(symbol)).await
    }
}
