//! Per-request transient prediction records. Signals are never persisted —
//! the Signal Service recomputes them on every `generate` call.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub predicted_return: f64,
    pub rank: i32,
    pub target_weight: f64,
}

/// Ranks symbols by predicted return and derives `target_weight` from rank,
/// not from the raw return's magnitude (open question resolved in
/// SPEC_FULL.md §9): longs split +1 evenly among top-N, shorts split -1
/// evenly among bottom-N.
pub fn rank_and_weight(predictions: Vec<(String, f64)>, top_n: usize, bottom_n: usize) -> Vec<Signal> {
    let mut sorted = predictions;
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1));

    let n = sorted.len();
    let top_n = top_n.min(n);
    let bottom_n = bottom_n.min(n.saturating_sub(top_n));

    let mut signals = Vec::with_capacity(n);
    for (idx, (symbol, predicted_return)) in sorted.into_iter().enumerate() {
        let rank = (idx + 1) as i32;
        let target_weight = if idx < top_n && top_n > 0 {
            1.0 / top_n as f64
        } else if idx >= n - bottom_n && bottom_n > 0 {
            -1.0 / bottom_n as f64
        } else {
            0.0
        };
        signals.push(Signal {
            symbol,
            predicted_return,
            rank,
            target_weight,
        });
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight_sum(signals: &[Signal], positive: bool) -> f64 {
        signals
            .iter()
            .map(|s| s.target_weight)
            .filter(|w| if positive { *w > 0.0 } else { *w < 0.0 })
            .sum()
    }

    #[test]
    fn longs_sum_to_one_shorts_sum_to_minus_one() {
        let preds = vec![
            ("AAPL".into(), 0.05),
            ("MSFT".into(), 0.04),
            ("GOOGL".into(), 0.03),
            ("AMZN".into(), -0.02),
            ("TSLA".into(), -0.03),
        ];
        let signals = rank_and_weight(preds, 3, 2);
        assert!((weight_sum(&signals, true) - 1.0).abs() < 1e-9);
        assert!((weight_sum(&signals, false) - (-1.0)).abs() < 1e-9);
    }

    #[test]
    fn rank_one_is_highest_predicted_return() {
        let preds = vec![("A".into(), 0.01), ("B".into(), 0.09)];
        let signals = rank_and_weight(preds, 1, 0);
        let best = signals.iter().find(|s| s.rank == 1).unwrap();
        assert_eq!(best.symbol, "B");
    }

    #[test]
    fn empty_top_and_bottom_yields_zero_weights() {
        let preds = vec![("A".into(), 0.01), ("B".into(), 0.02)];
        let signals = rank_and_weight(preds, 0, 0);
        assert!(signals.iter().all(|s| s.target_weight == 0.0));
    }
}
