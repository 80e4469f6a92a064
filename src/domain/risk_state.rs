//! Process-wide risk state objects (spec §3, §4.4). Generalized from the
//! teacher's single in-memory `RiskState` struct into the distinct objects
//! the spec names, all backed by `risk_kv` rows rather than per-process
//! memory (SPEC_FULL.md §9's cross-process externalization note).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillSwitch {
    Engaged,
    Disengaged,
}

impl Default for KillSwitch {
    fn default() -> Self {
        KillSwitch::Disengaged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerState {
    Open,
    Tripped,
    QuietPeriod,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        CircuitBreakerState::Open
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerTrip {
    pub reason: String,
    pub tripped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationGate {
    Closed,
    Open,
    ReduceOnly,
}

impl Default for ReconciliationGate {
    fn default() -> Self {
        ReconciliationGate::Closed
    }
}

/// A snapshot of everything the pre-trade gate needs to read in one shot;
/// assembled by `application::risk` from several `risk_kv` reads.
#[derive(Debug, Clone, Copy)]
pub struct RiskSnapshot {
    pub kill_switch: KillSwitch,
    pub circuit_breaker: CircuitBreakerState,
    pub quiet_period_deadline: Option<DateTime<Utc>>,
    pub reconciliation_gate: ReconciliationGate,
    pub high_water_mark: DateTime<Utc>,
}

impl RiskSnapshot {
    pub fn submission_allowed(&self) -> bool {
        self.kill_switch == KillSwitch::Disengaged
            && self.circuit_breaker == CircuitBreakerState::Open
            && self.reconciliation_gate != ReconciliationGate::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_allowed_requires_all_gates_clear() {
        let open = RiskSnapshot {
            kill_switch: KillSwitch::Disengaged,
            circuit_breaker: CircuitBreakerState::Open,
            quiet_period_deadline: None,
            reconciliation_gate: ReconciliationGate::Open,
            high_water_mark: Utc::now(),
        };
        assert!(open.submission_allowed());

        let mut engaged = open;
        engaged.kill_switch = KillSwitch::Engaged;
        assert!(!engaged.submission_allowed());

        engaged.kill_switch = KillSwitch::Disengaged;
        engaged.circuit_breaker = CircuitBreakerState::Tripped;
        assert!(!engaged.submission_allowed());

        engaged.circuit_breaker = CircuitBreakerState::Open;
        engaged.reconciliation_gate = ReconciliationGate::Closed;
        assert!(!engaged.submission_allowed());
    }
}
