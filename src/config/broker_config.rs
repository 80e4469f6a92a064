//! Broker configuration parsing from environment variables.
//!
//! Trimmed from the teacher's multi-broker (Alpaca/Binance/OANDA) config to
//! the single Alpaca adapter the Execution Gateway submits to (spec §6).

use std::env;

/// Alpaca API configuration — the only broker the control plane submits to.
#[derive(Debug, Clone)]
pub struct BrokerEnvConfig {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

impl BrokerEnvConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("BROKER_API_KEY").unwrap_or_default(),
            api_secret: env::var("BROKER_API_SECRET").unwrap_or_default(),
            base_url: env::var("BROKER_BASE_URL")
                .unwrap_or_else(|_| "https://paper-api.alpaca.markets".to_string()),
        }
    }
}
