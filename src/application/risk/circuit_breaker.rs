//! Three-state circuit breaker (spec §4.4): `open | tripped | quiet_period`.
//! Grounded on `infrastructure::core::circuit_breaker`'s state-machine shape
//! and `tracing` transition logging, rebuilt against `risk_kv` instead of
//! an in-process `RwLock` so every service instance observes the same trip.

use crate::domain::errors::AppError;
use crate::domain::ports::{BreakerHistory, RiskStore};
use crate::domain::risk_state::CircuitBreakerState;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::{KEY_BREAKER_QUIET_DEADLINE, KEY_BREAKER_STATE};

pub struct CircuitBreaker {
    store: Arc<dyn RiskStore>,
    history: Arc<dyn BreakerHistory>,
}

impl CircuitBreaker {
    pub fn new(store: Arc<dyn RiskStore>, history: Arc<dyn BreakerHistory>) -> Self {
        Self { store, history }
    }

    /// Reads the current state, passively completing a `quiet_period ->
    /// open` transition if the stored deadline has passed. Fails closed
    /// (`Tripped`) if the store is unreadable.
    pub async fn read(&self) -> CircuitBreakerState {
        let raw = match self.store.get(KEY_BREAKER_STATE).await {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "circuit breaker state unreadable, failing closed");
                return CircuitBreakerState::Tripped;
            }
        };

        let state = match raw.as_deref() {
            Some("tripped") => CircuitBreakerState::Tripped,
            Some("quiet_period") => CircuitBreakerState::QuietPeriod,
            _ => CircuitBreakerState::Open,
        };

        if state != CircuitBreakerState::QuietPeriod {
            return state;
        }

        let deadline = match self.store.get(KEY_BREAKER_QUIET_DEADLINE).await {
            Ok(Some(raw)) => DateTime::parse_from_rfc3339(&raw).ok().map(|d| d.with_timezone(&Utc)),
            _ => None,
        };

        match deadline {
            Some(deadline) if Utc::now() >= deadline => {
                if self.store.set(KEY_BREAKER_STATE, "open").await.is_ok() {
                    info!("circuit breaker quiet period elapsed, reopened");
                    CircuitBreakerState::Open
                } else {
                    CircuitBreakerState::QuietPeriod
                }
            }
            _ => CircuitBreakerState::QuietPeriod,
        }
    }

    pub async fn trip(&self, reason: &str) -> Result<(), AppError> {
        self.store.set(KEY_BREAKER_STATE, "tripped").await?;
        self.history.record_trip(reason, Utc::now()).await?;
        warn!(reason, "circuit breaker tripped");
        Ok(())
    }

    /// Operator reset: tripped -> quiet_period, with a deadline `quiet_period_minutes` out.
    pub async fn reset_to_quiet_period(&self, quiet_period_minutes: i64) -> Result<(), AppError> {
        let deadline = Utc::now() + chrono::Duration::minutes(quiet_period_minutes);
        self.store.set(KEY_BREAKER_STATE, "quiet_period").await?;
        self.store
            .set(KEY_BREAKER_QUIET_DEADLINE, &deadline.to_rfc3339())
            .await?;
        info!(quiet_period_minutes, "circuit breaker reset to quiet period");
        Ok(())
    }

    pub async fn history(&self, limit: i64) -> Result<Vec<(String, DateTime<Utc>)>, AppError> {
        self.history.list_trips(limit).await
    }
}
