//! Risk substrate (spec §4.4): kill switch, circuit breaker, position
//! reservation, quarantine, and the reconciliation gate. Every object here
//! is a thin typed wrapper around `RiskStore` reads/writes — per
//! SPEC_FULL.md §9's externalization note, none of it lives in per-process
//! memory, generalized from the teacher's in-process
//! `Arc<RwLock<RiskState>>` singleton.

pub mod circuit_breaker;
pub mod kill_switch;
pub mod quarantine;
pub mod reconciliation_gate;
pub mod reservation;
pub mod snapshot;
#[cfg(test)]
pub mod test_support;

pub use circuit_breaker::CircuitBreaker;
pub use kill_switch::KillSwitchGuard;
pub use quarantine::QuarantineGuard;
pub use reconciliation_gate::ReconciliationGateGuard;
pub use reservation::ReservationLedger;
pub use snapshot::read_snapshot;

pub const KEY_KILL_SWITCH: &str = "kill_switch:engaged";
pub const KEY_BREAKER_STATE: &str = "circuit_breaker:state";
pub const KEY_BREAKER_QUIET_DEADLINE: &str = "circuit_breaker:quiet_deadline";
pub const KEY_RECONCILIATION_GATE: &str = "reconciliation:gate";
pub const KEY_RECONCILIATION_HWM: &str = "reconciliation:high_water_mark";
pub const KEY_RECONCILIATION_LOCK: &str = "reconciliation:running";

pub fn reservation_key(symbol: &str) -> String {
    format!("position:reservation:{symbol}")
}

pub fn quarantine_key(symbol: &str) -> String {
    format!("quarantine:{symbol}")
}
