//! Execution-gateway-specific configuration (spec §6, §9).
//!
//! `DRY_RUN`/`WEBHOOK_SECRET` gating in particular implements the REDESIGN
//! FLAG in SPEC_FULL.md §9: a missing secret with `DRY_RUN=false` is a
//! startup failure (exit code 2), not a warning.

use anyhow::{Context, Result, bail};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayEnvConfig {
    pub dry_run: bool,
    pub webhook_secret: Option<String>,
    pub database_url: String,
    pub risk_store_url: String,
    pub gateway_bind_addr: String,
    pub signal_bind_addr: String,
    pub orchestrator_bind_addr: String,
    pub reconciliation_interval_seconds: u64,
    pub reconciliation_grace_seconds: i64,
    pub model_reload_interval_seconds: u64,
    pub reservation_ttl_seconds: i64,
    pub model_probe_input_path: Option<String>,
    pub request_deadline: Duration,
}

impl GatewayEnvConfig {
    pub fn from_env() -> Result<Self> {
        let dry_run = Self::parse_bool("DRY_RUN", true);
        let webhook_secret = env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());

        if !dry_run && webhook_secret.is_none() {
            bail!(
                "WEBHOOK_SECRET is required when DRY_RUN=false (spec §9: webhook secret \
                 gating is a startup failure, not a warning)"
            );
        }

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./tradectl.db".to_string());
        let risk_store_url = env::var("RISK_STORE_URL").unwrap_or_else(|_| database_url.clone());

        Ok(Self {
            dry_run,
            webhook_secret,
            database_url,
            risk_store_url,
            gateway_bind_addr: env::var("GATEWAY_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            signal_bind_addr: env::var("SIGNAL_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8081".to_string()),
            orchestrator_bind_addr: env::var("ORCHESTRATOR_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8082".to_string()),
            reconciliation_interval_seconds: Self::parse_u64(
                "RECONCILIATION_INTERVAL_SECONDS",
                60,
            )?,
            reconciliation_grace_seconds: Self::parse_i64("RECONCILIATION_GRACE_SECONDS", 300)?,
            model_reload_interval_seconds: Self::parse_u64("MODEL_RELOAD_INTERVAL_SECONDS", 300)?,
            reservation_ttl_seconds: Self::parse_i64("RESERVATION_TTL_SECONDS", 900)?,
            model_probe_input_path: env::var("MODEL_PROBE_INPUT_PATH").ok(),
            request_deadline: Duration::from_secs(Self::parse_u64("REQUEST_DEADLINE_SECONDS", 30)?),
        })
    }

    fn parse_u64(key: &str, default: u64) -> Result<u64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<u64>()
            .with_context(|| format!("failed to parse {key}"))
    }

    fn parse_i64(key: &str, default: i64) -> Result<i64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<i64>()
            .with_context(|| format!("failed to parse {key}"))
    }

    fn parse_bool(key: &str, default: bool) -> bool {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<bool>()
            .unwrap_or(default)
    }
}
