//! Hurst exponent (R/S analysis) and skewness, carried near-verbatim from
//! the teacher's `application::market_data::statistical_features` — the
//! math doesn't change just because the feed does.

/// Rescaled-range estimate of the Hurst exponent. `H = 0.5` is a random
/// walk, `H > 0.5` trending, `H < 0.5` mean-reverting. `None` below 20
/// observations or when the lag regression degenerates.
pub fn hurst_exponent(prices: &[f64], lags: &[usize]) -> Option<f64> {
    if prices.len() < 20 || lags.is_empty() {
        return None;
    }

    let mut returns = Vec::with_capacity(prices.len() - 1);
    for i in 1..prices.len() {
        if prices[i - 1] > 0.0 && prices[i] > 0.0 {
            returns.push((prices[i] / prices[i - 1]).ln());
        }
    }
    if returns.is_empty() {
        return None;
    }

    let mut log_lags = Vec::new();
    let mut log_rs = Vec::new();
    for &lag in lags {
        if lag >= returns.len() {
            continue;
        }
        if let Some(rs) = rescaled_range_for_lag(&returns, lag) {
            log_lags.push((lag as f64).ln());
            log_rs.push(rs.ln());
        }
    }
    if log_lags.len() < 2 {
        return None;
    }

    let hurst = linear_regression_slope(&log_lags, &log_rs)?;
    Some(hurst.clamp(0.0, 1.0))
}

fn rescaled_range_for_lag(returns: &[f64], lag: usize) -> Option<f64> {
    let n_subseries = returns.len() / lag;
    if n_subseries == 0 {
        return None;
    }

    let mut rs_values = Vec::new();
    for i in 0..n_subseries {
        let start = i * lag;
        let end = start + lag;
        if end > returns.len() {
            break;
        }
        let subseries = &returns[start..end];
        let mean: f64 = subseries.iter().sum::<f64>() / subseries.len() as f64;

        let mut cumsum = 0.0;
        let mut deviations = Vec::with_capacity(subseries.len());
        for &r in subseries {
            cumsum += r - mean;
            deviations.push(cumsum);
        }

        let max_dev = deviations.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min_dev = deviations.iter().cloned().fold(f64::INFINITY, f64::min);
        let range = max_dev - min_dev;

        let variance: f64 = subseries.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / subseries.len() as f64;
        let std_dev = variance.sqrt();
        if std_dev > 0.0 {
            rs_values.push(range / std_dev);
        }
    }

    if rs_values.is_empty() {
        None
    } else {
        Some(rs_values.iter().sum::<f64>() / rs_values.len() as f64)
    }
}

fn linear_regression_slope(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.is_empty() {
        return None;
    }
    let n = x.len() as f64;
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y.iter()).map(|(xi, yi)| xi * yi).sum();
    let sum_x2: f64 = x.iter().map(|xi| xi * xi).sum();

    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator.abs() < 1e-10 {
        return None;
    }
    Some((n * sum_xy - sum_x * sum_y) / denominator)
}

/// Third standardized moment. `None` below 3 observations or when the
/// series has (near) zero variance.
pub fn skewness(values: &[f64]) -> Option<f64> {
    if values.len() < 3 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev < 1e-10 {
        return None;
    }
    Some(values.iter().map(|v| ((v - mean) / std_dev).powi(3)).sum::<f64>() / n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trending_series_has_hurst_above_half() {
        let prices: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
        let h = hurst_exponent(&prices, &[2, 4, 8, 16]).unwrap();
        assert!(h > 0.5, "expected trending hurst > 0.5, got {h}");
    }

    #[test]
    fn mean_reverting_series_has_hurst_below_half() {
        let prices: Vec<f64> = (0..50).map(|i| 100.0 + if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let h = hurst_exponent(&prices, &[2, 4, 8, 16]).unwrap();
        assert!(h < 0.5, "expected mean-reverting hurst < 0.5, got {h}");
    }

    #[test]
    fn insufficient_data_returns_none() {
        assert!(hurst_exponent(&[100.0, 101.0, 102.0], &[2, 4]).is_none());
    }

    #[test]
    fn right_skewed_distribution_is_positive() {
        let skew = skewness(&[1.0, 1.0, 1.0, 1.0, 10.0]).unwrap();
        assert!(skew > 0.0);
    }
}
