//! Configuration for the trade control plane.
//!
//! Environment-gated configuration (spec §6) loaded through a layered
//! `from_env()` pattern: one small typed sub-config per concern, aggregated
//! here into a top-level `Config` — the same shape the teacher used for its
//! broker/strategy/risk/observability split, generalized to this system's
//! concerns.

mod broker_config;
mod gateway_config;
mod observability_config;
mod risk_env_config;

pub use broker_config::BrokerEnvConfig;
pub use gateway_config::GatewayEnvConfig;
pub use observability_config::ObservabilityEnvConfig;
pub use risk_env_config::RiskEnvConfig;

use anyhow::Result;

/// Aggregate configuration shared by all three binaries. Each binary reads
/// only the sub-configs it needs, but loading them together at startup
/// means a single misconfigured env var fails fast in every service rather
/// than only the one that happens to touch it first.
#[derive(Debug, Clone)]
pub struct Config {
    pub gateway: GatewayEnvConfig,
    pub broker: BrokerEnvConfig,
    pub risk: RiskEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            gateway: GatewayEnvConfig::from_env()?,
            broker: BrokerEnvConfig::from_env(),
            risk: RiskEnvConfig::from_env()?,
            observability: ObservabilityEnvConfig::from_env(),
        })
    }
}
