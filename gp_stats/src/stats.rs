//! Descriptive statistics used by the metric library.
//!
//! Everything here takes plain slices and returns `Option` when the input
//! is too small or degenerate for the statistic to be defined. Callers
//! drop undefined values instead of propagating NaN.

use ndarray::Array1;

#[cfg(feature = "ci-stats")]
use statrs::distribution::{ContinuousCDF, StudentsT};

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (n - 1 denominator); undefined for fewer than 2 values.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (values.len() - 1) as f64)
}

/// Quantile with linear interpolation between order statistics, matching
/// the conventional definition over `q` in [0, 1].
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let frac = pos - lo as f64;
    if lo + 1 < sorted.len() {
        Some(sorted[lo] + frac * (sorted[lo + 1] - sorted[lo]))
    } else {
        Some(sorted[lo])
    }
}

/// Ranks starting at 1, ties assigned the average of their rank range.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // ranks i+1 ..= j+1 share one tie group
        let avg = (i + j + 2) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Pearson correlation; undefined for n < 2 or zero variance on either side.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let xs = Array1::from_vec(x.to_vec());
    let ys = Array1::from_vec(y.to_vec());
    let mx = xs.mean()?;
    let my = ys.mean()?;
    let dx = &xs - mx;
    let dy = &ys - my;
    let cov = dx.dot(&dy);
    let denom = (dx.dot(&dx) * dy.dot(&dy)).sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(cov / denom)
}

/// Spearman rank correlation over paired observations.
pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    pearson(&average_ranks(x), &average_ranks(y))
}

/// Ordinary least-squares line fit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

/// Fit `y = slope * x + intercept`; undefined for n < 2 or constant x.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let xs = Array1::from_vec(x.to_vec());
    let ys = Array1::from_vec(y.to_vec());
    let mx = xs.mean()?;
    let my = ys.mean()?;
    let dx = &xs - mx;
    let sxx = dx.dot(&dx);
    if sxx <= f64::EPSILON {
        return None;
    }
    let slope = dx.dot(&(&ys - my)) / sxx;
    Some(LinearFit {
        slope,
        intercept: my - slope * mx,
    })
}

/// 95% confidence interval for the OLS slope via the Student's t
/// distribution. Needs n >= 3 so the residual degrees of freedom are
/// positive; returns `None` when the interval is not finite.
#[cfg(feature = "ci-stats")]
pub fn slope_confidence(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    if x.len() != y.len() || x.len() < 3 {
        return None;
    }
    let fit = linear_fit(x, y)?;
    let n = x.len();
    let mx = mean(x)?;
    let sxx: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
    if sxx <= f64::EPSILON {
        return None;
    }
    let sse: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(&xi, &yi)| (yi - (fit.slope * xi + fit.intercept)).powi(2))
        .sum();
    let se = (sse / (n - 2) as f64 / sxx).sqrt();
    let t = StudentsT::new(0.0, 1.0, (n - 2) as f64)
        .ok()?
        .inverse_cdf(0.975);
    let (low, high) = (fit.slope - t * se, fit.slope + t * se);
    if low.is_finite() && high.is_finite() {
        Some((low, high))
    } else {
        None
    }
}
