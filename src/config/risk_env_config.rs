//! Risk substrate configuration parsing from environment variables.
//!
//! Generalized from the teacher's position-sizing/drawdown config into the
//! gate thresholds spec §4.2/§4.4/§6 name: per-symbol position limits, the
//! daily loss limit the circuit breaker's post-trade monitor trips on, and
//! the fat-finger warn/reject notional bands.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

const POSITION_LIMIT_PREFIX: &str = "POSITION_LIMIT_";
const DEFAULT_POSITION_LIMIT: i64 = 10_000;

#[derive(Debug, Clone)]
pub struct RiskEnvConfig {
    /// Per-symbol absolute position limits, keyed by `POSITION_LIMIT_<SYMBOL>`.
    /// A symbol with no explicit entry falls back to `default_position_limit`.
    pub position_limits: HashMap<String, i64>,
    pub default_position_limit: i64,
    pub daily_loss_limit: Decimal,
    pub max_drawdown_pct: Decimal,
    pub data_staleness_limit_minutes: i64,
    pub consecutive_broker_error_limit: u32,
    pub quiet_period_minutes: i64,
    pub fat_finger_warn_notional: Decimal,
    pub fat_finger_reject_notional: Decimal,
    pub fat_finger_reject_qty: i64,
}

impl RiskEnvConfig {
    pub fn from_env() -> Result<Self> {
        let mut position_limits = HashMap::new();
        for (key, value) in env::vars() {
            if let Some(symbol) = key.strip_prefix(POSITION_LIMIT_PREFIX) {
                let limit = value
                    .parse::<i64>()
                    .with_context(|| format!("failed to parse {key}"))?;
                position_limits.insert(symbol.to_string(), limit);
            }
        }

        Ok(Self {
            position_limits,
            default_position_limit: Self::parse_i64("DEFAULT_POSITION_LIMIT", DEFAULT_POSITION_LIMIT)?,
            daily_loss_limit: Self::parse_decimal("DAILY_LOSS_LIMIT", "5000")?,
            max_drawdown_pct: Self::parse_decimal("MAX_DRAWDOWN_PCT", "0.10")?,
            data_staleness_limit_minutes: Self::parse_i64("DATA_STALENESS_LIMIT_MINUTES", 10)?,
            consecutive_broker_error_limit: Self::parse_u32("CONSECUTIVE_BROKER_ERROR_LIMIT", 5)?,
            quiet_period_minutes: Self::parse_i64("QUIET_PERIOD_MINUTES", 30)?,
            fat_finger_warn_notional: Self::parse_decimal("FAT_FINGER_WARN_NOTIONAL", "25000")?,
            fat_finger_reject_notional: Self::parse_decimal("FAT_FINGER_REJECT_NOTIONAL", "100000")?,
            fat_finger_reject_qty: Self::parse_i64("FAT_FINGER_REJECT_QTY", 50_000)?,
        })
    }

    /// Absolute position limit for `symbol`: explicit `POSITION_LIMIT_<SYMBOL>`
    /// override, else `default_position_limit`.
    pub fn position_limit(&self, symbol: &str) -> i64 {
        self.position_limits
            .get(symbol)
            .copied()
            .unwrap_or(self.default_position_limit)
    }

    fn parse_i64(key: &str, default: i64) -> Result<i64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<i64>()
            .with_context(|| format!("failed to parse {key}"))
    }

    fn parse_u32(key: &str, default: u32) -> Result<u32> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<u32>()
            .with_context(|| format!("failed to parse {key}"))
    }

    fn parse_decimal(key: &str, default: &str) -> Result<Decimal> {
        let raw = env::var(key).unwrap_or_else(|_| default.to_string());
        Decimal::from_str(&raw).with_context(|| format!("failed to parse {key}"))
    }
}
