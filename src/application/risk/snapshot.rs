//! Assembles the single `RiskSnapshot` the pre-trade gate pipeline reads
//! in one shot, so a submit request pays one round of `risk_kv` reads
//! instead of threading four guards through the gate chain individually.

use crate::domain::ports::RiskStore;
use crate::domain::risk_state::{CircuitBreakerState, RiskSnapshot};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{CircuitBreaker, KillSwitchGuard, ReconciliationGateGuard, KEY_BREAKER_QUIET_DEADLINE};

pub async fn read_snapshot(
    store: &Arc<dyn RiskStore>,
    breaker: &CircuitBreaker,
    kill_switch: &KillSwitchGuard,
    reconciliation: &ReconciliationGateGuard,
) -> RiskSnapshot {
    let circuit_breaker = breaker.read().await;

    let quiet_period_deadline = if circuit_breaker == CircuitBreakerState::QuietPeriod {
        store
            .get(KEY_BREAKER_QUIET_DEADLINE)
            .await
            .ok()
            .flatten()
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|d| d.with_timezone(&Utc))
    } else {
        None
    };

    RiskSnapshot {
        kill_switch: kill_switch.read().await,
        circuit_breaker,
        quiet_period_deadline,
        reconciliation_gate: reconciliation.read().await,
        high_water_mark: reconciliation
            .high_water_mark()
            .await
            .unwrap_or(DateTime::UNIX_EPOCH),
    }
}
