//! Column statistics over nullable samples.
//!
//! Conventions:
//! - nulls (and non-finite values) are skipped, never propagated
//! - standard deviation and variance use the sample (n − 1) denominator
//! - quantiles use linear interpolation between closest ranks
//! - undefined results are `None`; callers pick their own sentinel

/// Non-null, finite values of a column.
pub fn present(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().flatten().copied().filter(|v| v.is_finite()).collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (n − 1). `None` for fewer than two values.
/// Every value equal (exact comparison). Empty samples count as constant.
pub fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let n = values.len() as f64;
    Some(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1.0))
}

/// Sample standard deviation (n − 1). `None` for fewer than two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(f64::sqrt)
}

/// Quantile `q ∈ [0, 1]` of an already sorted slice (linear interpolation).
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Sorted copy of the values.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    quantile_sorted(&sorted(values), q)
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// First quartile, third quartile, and their spread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quartiles {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
}

impl Quartiles {
    pub fn of(values: &[f64]) -> Option<Self> {
        let s = sorted(values);
        Some(Self {
            q1: quantile_sorted(&s, 0.25)?,
            median: quantile_sorted(&s, 0.5)?,
            q3: quantile_sorted(&s, 0.75)?,
        })
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

/// Bias-adjusted sample skewness (Fisher–Pearson G1).
///
/// `None` below three values; zero for a constant sample.
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let m = mean(values)?;
    let nf = n as f64;
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / nf;
    let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / nf;
    if m2 <= f64::EPSILON * m.abs().max(1.0) {
        return Some(0.0);
    }
    Some((nf * (nf - 1.0)).sqrt() / (nf - 2.0) * m3 / m2.powf(1.5))
}

/// Unbiased excess kurtosis (Fisher G2).
///
/// `None` below four values; zero for a constant sample.
pub fn kurtosis(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 4 {
        return None;
    }
    let m = mean(values)?;
    let nf = n as f64;
    let s2: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    let s4: f64 = values.iter().map(|v| (v - m).powi(4)).sum();
    if s2 <= f64::EPSILON * m.abs().max(1.0) {
        return Some(0.0);
    }
    let numer = nf * (nf + 1.0) * (nf - 1.0) * s4;
    let denom = (nf - 2.0) * (nf - 3.0) * s2 * s2;
    let adj = 3.0 * (nf - 1.0).powi(2) / ((nf - 2.0) * (nf - 3.0));
    Some(numer / denom - adj)
}

/// Median of absolute deviations from the median.
pub fn median_abs_deviation(values: &[f64]) -> Option<f64> {
    let med = median(values)?;
    let devs: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    median(&devs)
}

/// Round half-to-even at `decimals` places.
pub fn round_dp(x: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (x * factor).round_ties_even() / factor
}

/// Replace non-finite results with `sentinel`.
pub fn finite_or(x: f64, sentinel: f64) -> f64 {
    if x.is_finite() { x } else { sentinel }
}
