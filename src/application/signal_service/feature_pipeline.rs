//! Feature computation from recent bar history into the fixed-order
//! `FeatureSet` the model registry expects (spec §4.1's feature-parity
//! pipeline). Technical indicators reuse the `ta` crate the way the
//! teacher's `TechnicalFeatureEngineeringService` does (replaying closes
//! through stateful `Next` indicators); `hurst`/`skewness` are carried
//! near-verbatim from `application::market_data::statistical_features`.
//! The order-flow/regime features the teacher derives from a live tick
//! stream (`ofi`, `cumulative_delta`, `adx`) are approximated here from bar
//! history alone, since this system has no live quote feed to replay.

use crate::domain::features::FeatureSet;
use crate::domain::ports::PriceBar;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use ta::Next;
use ta::indicators::{AverageTrueRange, BollingerBands, MovingAverageConvergenceDivergence, RelativeStrengthIndex};

const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const BB_PERIOD: usize = 20;
const BB_STD_DEV: f64 = 2.0;
const ATR_PERIOD: usize = 14;
const HURST_LAGS: [usize; 4] = [2, 4, 8, 16];
const MOMENTUM_LOOKBACK: usize = 10;
const VOLATILITY_WINDOW: usize = 20;

fn to_decimal(v: f64) -> Option<Decimal> {
    Decimal::from_f64(v)
}

/// Replays `bars` (oldest first) through the full indicator stack and
/// returns the feature set as of the most recent bar. Requires no minimum
/// bar count to run — each indicator simply reports whatever its own
/// warm-up behavior gives it on a short history, and the caller (spec
/// §4.1) treats the degraded output as a worse, not failing, prediction.
pub fn compute_features(bars: &[PriceBar]) -> FeatureSet {
    if bars.is_empty() {
        return FeatureSet::default();
    }

    let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD).expect("valid rsi period");
    let mut macd = MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
        .expect("valid macd periods");
    let mut bb = BollingerBands::new(BB_PERIOD, BB_STD_DEV).expect("valid bollinger params");
    let mut atr = AverageTrueRange::new(ATR_PERIOD).expect("valid atr period");

    let closes: Vec<f64> = bars.iter().filter_map(|b| b.close.to_f64()).collect();

    let mut last_rsi = None;
    let mut last_macd = None;
    let mut last_bb = None;
    let mut last_atr = None;

    for bar in bars {
        let close = bar.close.to_f64().unwrap_or(0.0);
        last_rsi = Some(rsi.next(close));
        last_macd = Some(macd.next(close));
        last_bb = Some(bb.next(close));
        // `ta`'s AverageTrueRange implements `Next<f64>` against close only
        // in this build, matching the teacher's usage in
        // `feature_engineering_service.rs` rather than the full-OHLC form.
        last_atr = Some(atr.next(close));
    }

    let last_close = bars.last().map(|b| b.close).unwrap_or(Decimal::ZERO);
    let last_close_f64 = last_close.to_f64().unwrap_or(0.0);

    let atr_pct = last_atr.filter(|_| last_close_f64 != 0.0).map(|a| a / last_close_f64 * 100.0);

    let bb_width = last_bb.as_ref().and_then(|v| {
        if v.average.abs() < f64::EPSILON {
            None
        } else {
            Some((v.upper - v.lower) / v.average)
        }
    });
    let bb_position = last_bb.as_ref().and_then(|v| {
        let range = v.upper - v.lower;
        if range.abs() < f64::EPSILON {
            None
        } else {
            Some((last_close_f64 - v.lower) / range)
        }
    });

    let hurst = super::statistical_features::hurst_exponent(&closes, &HURST_LAGS).and_then(to_decimal);
    let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).filter(|v| v.is_finite()).collect();
    let skewness = super::statistical_features::skewness(&returns).and_then(to_decimal);

    let momentum_normalized = momentum_norm(&closes);
    let realized_volatility = realized_volatility(&returns);
    let (ofi, cumulative_delta) = order_flow_approx(bars);
    let spread_bps = spread_bps(bars.last());
    let adx = adx_approx(bars);

    FeatureSet {
        rsi: last_rsi.and_then(to_decimal),
        macd_line: last_macd.as_ref().and_then(|v| to_decimal(v.macd)),
        macd_signal: last_macd.as_ref().and_then(|v| to_decimal(v.signal)),
        macd_hist: last_macd.as_ref().and_then(|v| to_decimal(v.histogram)),
        bb_width: bb_width.and_then(to_decimal),
        bb_position: bb_position.and_then(to_decimal),
        atr_pct: atr_pct.and_then(to_decimal),
        hurst_exponent: hurst,
        skewness,
        momentum_normalized,
        realized_volatility,
        ofi,
        cumulative_delta,
        spread_bps,
        adx,
    }
}

/// Close-to-close return over `MOMENTUM_LOOKBACK` bars, normalized by the
/// realized volatility over the same window so momentum is comparable
/// across symbols with different volatility regimes.
fn momentum_norm(closes: &[f64]) -> Option<Decimal> {
    if closes.len() <= MOMENTUM_LOOKBACK {
        return None;
    }
    let start = closes[closes.len() - 1 - MOMENTUM_LOOKBACK];
    let end = *closes.last()?;
    if start == 0.0 {
        return None;
    }
    let raw_return = (end - start) / start;
    let vol = realized_volatility(&closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect::<Vec<_>>())?;
    let vol_f64 = vol.to_f64().unwrap_or(0.0);
    if vol_f64.abs() < 1e-9 {
        return to_decimal(raw_return);
    }
    to_decimal(raw_return / vol_f64)
}

fn realized_volatility(returns: &[f64]) -> Option<Decimal> {
    let window: Vec<f64> = returns.iter().rev().take(VOLATILITY_WINDOW).cloned().collect();
    if window.len() < 2 {
        return None;
    }
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let variance = window.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / window.len() as f64;
    to_decimal(variance.sqrt())
}

/// Approximates order-flow imbalance and cumulative signed volume from bar
/// direction and volume, since the feed this system reads from is bars, not
/// a trade-by-trade tape. `ofi` is the sign of the last close-to-close move
/// weighted by that bar's volume share of the window; `cumulative_delta` is
/// the running signed-volume sum over the available window.
fn order_flow_approx(bars: &[PriceBar]) -> (Option<Decimal>, Option<Decimal>) {
    if bars.len() < 2 {
        return (None, None);
    }
    let total_volume: f64 = bars.iter().filter_map(|b| b.volume.to_f64()).sum();
    if total_volume <= 0.0 {
        return (None, None);
    }

    let mut cumulative = 0.0;
    let mut last_signed_share = 0.0;
    for w in bars.windows(2) {
        let prev_close = w[0].close.to_f64().unwrap_or(0.0);
        let close = w[1].close.to_f64().unwrap_or(0.0);
        let volume = w[1].volume.to_f64().unwrap_or(0.0);
        let sign = if close > prev_close { 1.0 } else if close < prev_close { -1.0 } else { 0.0 };
        cumulative += sign * volume;
        last_signed_share = sign * (volume / total_volume);
    }

    (to_decimal(last_signed_share), to_decimal(cumulative))
}

fn spread_bps(last_bar: Option<&PriceBar>) -> Option<Decimal> {
    let bar = last_bar?;
    let (bid, ask) = (bar.bid?, bar.ask?);
    let mid = (bid + ask) / Decimal::from(2);
    if mid.is_zero() {
        return None;
    }
    Some((ask - bid) / mid * Decimal::from(10_000))
}

/// Average directional index approximated from bar-to-bar high/low range
/// expansion rather than the teacher's full Wilder smoothing, since the
/// `ta` crate pinned here does not ship an ADX indicator.
fn adx_approx(bars: &[PriceBar]) -> Option<Decimal> {
    if bars.len() < 15 {
        return None;
    }
    let window = &bars[bars.len() - 14..];
    let mut plus_dm = 0.0;
    let mut minus_dm = 0.0;
    let mut tr_sum = 0.0;
    for w in window.windows(2) {
        let up = (w[1].high - w[0].high).to_f64().unwrap_or(0.0);
        let down = (w[0].low - w[1].low).to_f64().unwrap_or(0.0);
        if up > down && up > 0.0 {
            plus_dm += up;
        }
        if down > up && down > 0.0 {
            minus_dm += down;
        }
        let tr = (w[1].high - w[1].low).to_f64().unwrap_or(0.0).abs();
        tr_sum += tr;
    }
    if tr_sum <= 0.0 {
        return None;
    }
    let plus_di = 100.0 * plus_dm / tr_sum;
    let minus_di = 100.0 * minus_dm / tr_sum;
    let sum_di = plus_di + minus_di;
    if sum_di <= 0.0 {
        return None;
    }
    let dx = 100.0 * (plus_di - minus_di).abs() / sum_di;
    to_decimal(dx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn bar(close: Decimal, volume: Decimal) -> PriceBar {
        PriceBar {
            timestamp: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume,
            bid: Some(close - dec!(0.05)),
            ask: Some(close + dec!(0.05)),
        }
    }

    #[test]
    fn empty_history_yields_default_feature_set() {
        let features = compute_features(&[]);
        assert!(features.rsi.is_none());
    }

    #[test]
    fn trending_series_produces_positive_momentum() {
        let bars: Vec<PriceBar> = (0..30).map(|i| bar(Decimal::from(100 + i), Decimal::from(1000))).collect();
        let features = compute_features(&bars);
        assert!(features.momentum_normalized.unwrap() > Decimal::ZERO);
        assert!(features.rsi.unwrap() > dec!(50));
    }

    #[test]
    fn spread_bps_uses_last_bar_quote() {
        let bars = vec![bar(dec!(100.00), Decimal::from(500))];
        let features = compute_features(&bars);
        assert!(features.spread_bps.is_some());
    }
}
