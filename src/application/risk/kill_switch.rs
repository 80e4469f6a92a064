//! Operator-controlled absolute block on new order submission (spec §4.4).
//! Disengaging requires explicit operator action and is audit-logged —
//! this module is the only legitimate writer of `kill_switch:engaged`.

use crate::domain::errors::AppError;
use crate::domain::ports::RiskStore;
use crate::domain::risk_state::KillSwitch;
use std::sync::Arc;
use tracing::{info, warn};

use super::KEY_KILL_SWITCH;

pub struct KillSwitchGuard {
    store: Arc<dyn RiskStore>,
}

impl KillSwitchGuard {
    pub fn new(store: Arc<dyn RiskStore>) -> Self {
        Self { store }
    }

    /// Fails closed: an unreadable risk store reads as `Engaged` rather
    /// than panicking or defaulting open (spec §4.2 step 2).
    pub async fn read(&self) -> KillSwitch {
        match self.store.get(KEY_KILL_SWITCH).await {
            Ok(Some(value)) if value == "true" => KillSwitch::Engaged,
            Ok(Some(_)) => KillSwitch::Disengaged,
            Ok(None) => KillSwitch::Disengaged,
            Err(err) => {
                warn!(%err, "kill switch unreadable, failing closed");
                KillSwitch::Engaged
            }
        }
    }

    pub async fn engage(&self, reason: &str) -> Result<(), AppError> {
        self.store.set(KEY_KILL_SWITCH, "true").await?;
        warn!(reason, "kill switch engaged");
        Ok(())
    }

    pub async fn disengage(&self, operator: &str) -> Result<(), AppError> {
        self.store.set(KEY_KILL_SWITCH, "false").await?;
        info!(operator, "kill switch disengaged");
        Ok(())
    }
}
