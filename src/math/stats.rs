//! Sample statistics, exponentially-weighted estimators, and path metrics.

/// Trading periods per year used for annualization.
pub const PERIODS_PER_YEAR: f64 = 252.0;

const MIN_STD: f64 = 1.0e-12;

/// Arithmetic mean.
///
/// # Panics
/// Panics on an empty slice.
pub fn sample_mean(values: &[f64]) -> f64 {
    assert!(!values.is_empty(), "values must not be empty");
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance (denominator `n - 1`).
///
/// # Panics
/// Panics with fewer than 2 observations.
pub fn sample_variance(values: &[f64]) -> f64 {
    assert!(values.len() >= 2, "at least 2 observations are required");
    let mean = sample_mean(values);
    let mut sum = 0.0;
    for &x in values {
        let d = x - mean;
        sum += d * d;
    }
    sum / (values.len() as f64 - 1.0)
}

/// Unbiased sample standard deviation.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    sample_variance(values).max(0.0).sqrt()
}

/// First four sample moments as `(mean, std, skewness, excess kurtosis)`.
pub fn sample_moments(values: &[f64]) -> (f64, f64, f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0, 0.0, 0.0);
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    let mut m2 = 0.0;
    let mut m3 = 0.0;
    let mut m4 = 0.0;
    for &x in values {
        let d = x - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    m2 /= n;
    m3 /= n;
    m4 /= n;

    if m2 <= MIN_STD * MIN_STD {
        return (mean, 0.0, 0.0, 0.0);
    }

    let std = m2.sqrt();
    let skew = m3 / m2.powf(1.5);
    let excess_kurtosis = m4 / (m2 * m2) - 3.0;
    (mean, std, skew, excess_kurtosis)
}

/// Linear-interpolated empirical quantile. Sorts `sample` in place.
///
/// # Panics
/// Panics on an empty sample or `p` outside `[0, 1]`.
pub fn empirical_quantile(sample: &mut [f64], p: f64) -> f64 {
    assert!(!sample.is_empty(), "sample must not be empty");
    assert!((0.0..=1.0).contains(&p), "p must lie in [0, 1]");

    sample.sort_by(|a, b| a.total_cmp(b));
    if sample.len() == 1 {
        return sample[0];
    }

    let rank = p * (sample.len() as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sample[lo]
    } else {
        let w = rank - lo as f64;
        sample[lo] + w * (sample[hi] - sample[lo])
    }
}

/// Normalized exponential-decay weights for a window of length `n`.
///
/// Index 0 of the output weights the most recent observation; weight for lag
/// `k` is proportional to `lambda^k`.
///
/// # Panics
/// Panics if `n == 0` or `lambda` is outside `(0, 1)`.
pub fn decay_weights(lambda: f64, n: usize) -> Vec<f64> {
    assert!(n > 0, "window must be non-empty");
    assert!(
        lambda.is_finite() && lambda > 0.0 && lambda < 1.0,
        "lambda must lie in (0, 1)"
    );

    let mut weights = Vec::with_capacity(n);
    let mut w = 1.0;
    let mut total = 0.0;
    for _ in 0..n {
        weights.push(w);
        total += w;
        w *= lambda;
    }
    for w in &mut weights {
        *w /= total;
    }
    weights
}

/// Exponentially-weighted per-period volatility of a return window.
///
/// Uses the zero-mean RiskMetrics convention: `sigma^2 = sum_k w_k r_{t-k}^2`,
/// where `window` is ordered oldest first and the most recent observation
/// receives the largest weight.
///
/// # Panics
/// Panics on an empty window or invalid `lambda`.
pub fn ew_volatility(window: &[f64], lambda: f64) -> f64 {
    let weights = decay_weights(lambda, window.len());
    let mut var = 0.0;
    for (k, &w) in weights.iter().enumerate() {
        let r = window[window.len() - 1 - k];
        var += w * r * r;
    }
    var.max(0.0).sqrt()
}

/// Annualized exponentially-weighted volatility of a return window.
pub fn ew_annualized_volatility(window: &[f64], lambda: f64) -> f64 {
    ew_volatility(window, lambda) * PERIODS_PER_YEAR.sqrt()
}

/// Exponentially-weighted correlation between two aligned return windows.
///
/// Zero-mean convention, consistent with [`ew_volatility`]. Returns 0 when
/// either series has negligible weighted variance.
///
/// # Panics
/// Panics on empty or misaligned windows, or invalid `lambda`.
pub fn ew_correlation(x: &[f64], y: &[f64], lambda: f64) -> f64 {
    assert_eq!(x.len(), y.len(), "windows must be aligned");
    let weights = decay_weights(lambda, x.len());

    let n = x.len();
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (k, &w) in weights.iter().enumerate() {
        let xi = x[n - 1 - k];
        let yi = y[n - 1 - k];
        cov += w * xi * yi;
        var_x += w * xi * xi;
        var_y += w * yi * yi;
    }

    if var_x <= MIN_STD * MIN_STD || var_y <= MIN_STD * MIN_STD {
        0.0
    } else {
        (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
    }
}

/// Mean pairwise exponentially-weighted correlation across aligned windows.
///
/// Returns 0 for fewer than two series (no pairs to correlate).
pub fn mean_pairwise_ew_correlation(windows: &[&[f64]], lambda: f64) -> f64 {
    if windows.len() < 2 {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut pairs = 0usize;
    for i in 0..windows.len() {
        for j in (i + 1)..windows.len() {
            sum += ew_correlation(windows[i], windows[j], lambda);
            pairs += 1;
        }
    }
    sum / pairs as f64
}

/// Momentum z-signal: short-window mean excess over the long-window mean,
/// scaled by the long-window standard error of a short-window mean.
///
/// # Panics
/// Panics if the series is shorter than `long_window` or windows are invalid.
pub fn momentum_zscore(series: &[f64], short_window: usize, long_window: usize) -> f64 {
    assert!(
        short_window > 0 && short_window < long_window,
        "windows must satisfy 0 < short < long"
    );
    assert!(
        series.len() >= long_window,
        "series must cover the long window"
    );

    let long = &series[series.len() - long_window..];
    let short = &series[series.len() - short_window..];

    let long_std = sample_std_dev(long);
    if long_std <= MIN_STD {
        return 0.0;
    }
    let se = long_std / (short_window as f64).sqrt();
    (sample_mean(short) - sample_mean(long)) / se
}

/// Maximum peak-to-trough drawdown of a compounded return path.
///
/// Returns a non-negative fraction; 0 for a monotone non-decreasing path.
pub fn max_drawdown(path_returns: &[f64]) -> f64 {
    let mut wealth = 1.0;
    let mut peak = 1.0;
    let mut worst = 0.0_f64;
    for &r in path_returns {
        wealth *= 1.0 + r;
        if wealth > peak {
            peak = wealth;
        }
        let dd = 1.0 - wealth / peak;
        if dd > worst {
            worst = dd;
        }
    }
    worst
}
