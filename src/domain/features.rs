//! Feature-parity pipeline: the serving-time feature vector the Signal
//! Service feeds to the active model. Carried close to verbatim from the
//! teacher's `domain::ml::feature_registry` — the ordering here must match
//! whatever produced the model artifact exactly once, not just today.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// This order MUST match the order the training pipeline used to produce
/// the model artifact. Any change here is a breaking change for every
/// `model_path` currently active.
pub const FEATURE_NAMES: &[&str] = &[
    "rsi",
    "macd",
    "macd_signal",
    "macd_hist",
    "bb_width",
    "bb_position",
    "atr_pct",
    "hurst",
    "skewness",
    "momentum_norm",
    "volatility",
    "ofi",
    "cumulative_delta",
    "spread_bps",
    "adx",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSet {
    pub rsi: Option<Decimal>,
    pub macd_line: Option<Decimal>,
    pub macd_signal: Option<Decimal>,
    pub macd_hist: Option<Decimal>,
    pub bb_width: Option<Decimal>,
    pub bb_position: Option<Decimal>,
    pub atr_pct: Option<Decimal>,
    pub hurst_exponent: Option<Decimal>,
    pub skewness: Option<Decimal>,
    pub momentum_normalized: Option<Decimal>,
    pub realized_volatility: Option<Decimal>,
    pub ofi: Option<Decimal>,
    pub cumulative_delta: Option<Decimal>,
    pub spread_bps: Option<Decimal>,
    pub adx: Option<Decimal>,
}

/// Flattens a `FeatureSet` into the fixed-order vector the ONNX session
/// expects. Missing values fall back to a neutral default rather than
/// failing the prediction outright — a symbol with a short history still
/// gets a (degraded) prediction instead of a 503.
pub fn to_vector(fs: &FeatureSet) -> Vec<f32> {
    let to_f32 = |opt: Option<Decimal>, default: f64| opt.and_then(|d| d.to_f32()).unwrap_or(default as f32);

    vec![
        to_f32(fs.rsi, 50.0),
        to_f32(fs.macd_line, 0.0),
        to_f32(fs.macd_signal, 0.0),
        to_f32(fs.macd_hist, 0.0),
        to_f32(fs.bb_width, 0.0),
        to_f32(fs.bb_position, 0.5),
        to_f32(fs.atr_pct, 0.0),
        to_f32(fs.hurst_exponent, 0.5),
        to_f32(fs.skewness, 0.0),
        to_f32(fs.momentum_normalized, 0.0),
        to_f32(fs.realized_volatility, 0.0),
        to_f32(fs.ofi, 0.0),
        to_f32(fs.cumulative_delta, 0.0),
        to_f32(fs.spread_bps, 0.0),
        to_f32(fs.adx, 0.0),
    ]
}

/// A fixed probe input used to validate a freshly-loaded model artifact
/// before it is swapped in (spec §4.1: "validates it by running a single
/// deterministic prediction on a fixed probe input").
pub fn probe_features() -> FeatureSet {
    FeatureSet::default()
}
