//! Reconciliation gate and high-water mark (spec §4.5): the submit
//! endpoint's startup gate. `Closed` until the first reconciliation cycle
//! succeeds; thereafter `Open` or `ReduceOnly` for the duration of a
//! periodic cycle, and the per-symbol `reconciliation:running` lock that
//! serializes concurrent cycles across instances.

use crate::domain::errors::AppError;
use crate::domain::ports::RiskStore;
use crate::domain::risk_state::ReconciliationGate;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::{KEY_RECONCILIATION_GATE, KEY_RECONCILIATION_HWM, KEY_RECONCILIATION_LOCK};

pub struct ReconciliationGateGuard {
    store: Arc<dyn RiskStore>,
}

impl ReconciliationGateGuard {
    pub fn new(store: Arc<dyn RiskStore>) -> Self {
        Self { store }
    }

    /// Fails closed: an unreadable store reads as `Closed`, the same state
    /// as "no reconciliation has ever run".
    pub async fn read(&self) -> ReconciliationGate {
        match self.store.get(KEY_RECONCILIATION_GATE).await {
            Ok(Some(value)) => match value.as_str() {
                "open" => ReconciliationGate::Open,
                "reduce_only" => ReconciliationGate::ReduceOnly,
                _ => ReconciliationGate::Closed,
            },
            Ok(None) => ReconciliationGate::Closed,
            Err(err) => {
                warn!(%err, "reconciliation gate unreadable, failing closed");
                ReconciliationGate::Closed
            }
        }
    }

    pub async fn set(&self, gate: ReconciliationGate) -> Result<(), AppError> {
        let value = match gate {
            ReconciliationGate::Closed => "closed",
            ReconciliationGate::Open => "open",
            ReconciliationGate::ReduceOnly => "reduce_only",
        };
        self.store.set(KEY_RECONCILIATION_GATE, value).await?;
        info!(gate = value, "reconciliation gate updated");
        Ok(())
    }

    /// Defaults to the Unix epoch when no cycle has completed yet, so the
    /// first cycle's lookback window covers all broker history.
    pub async fn high_water_mark(&self) -> Result<DateTime<Utc>, AppError> {
        match self.store.get(KEY_RECONCILIATION_HWM).await? {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| AppError::Internal(format!("corrupt high water mark: {e}"))),
            None => Ok(DateTime::UNIX_EPOCH),
        }
    }

    pub async fn advance_high_water_mark(&self, ts: DateTime<Utc>) -> Result<(), AppError> {
        self.store.set(KEY_RECONCILIATION_HWM, &ts.to_rfc3339()).await
    }

    /// Attempts to become the exclusive runner of a reconciliation cycle.
    pub async fn try_begin_cycle(&self, ttl_seconds: i64) -> Result<bool, AppError> {
        self.store.try_lock(KEY_RECONCILIATION_LOCK, ttl_seconds).await
    }

    pub async fn end_cycle(&self) -> Result<(), AppError> {
        self.store.unlock(KEY_RECONCILIATION_LOCK).await
    }
}
