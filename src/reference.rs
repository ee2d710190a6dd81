//! Plaintext statistics and error metrics used to validate encrypted
//! results.
//!
//! Moments are population moments (divided by `n`), matching the encrypted
//! formulas.

use itertools::{izip, Itertools};

/// `n` evenly spaced points from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Arithmetic mean.
pub fn mean(v: &[f64]) -> f64 {
    v.iter().sum::<f64>() / v.len() as f64
}

/// Population variance.
pub fn variance(v: &[f64]) -> f64 {
    let m = mean(v);
    v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / v.len() as f64
}

/// Population standard deviation.
pub fn std_dev(v: &[f64]) -> f64 {
    variance(v).sqrt()
}

/// `(v − μ) / σ` elementwise.
pub fn z_score_norm(v: &[f64]) -> Vec<f64> {
    let (m, s) = (mean(v), std_dev(v));
    v.iter().map(|x| (x - m) / s).collect()
}

fn central_moment(v: &[f64], k: i32) -> f64 {
    let m = mean(v);
    v.iter().map(|x| (x - m).powi(k)).sum::<f64>() / v.len() as f64
}

/// Population skewness.
pub fn skewness(v: &[f64]) -> f64 {
    central_moment(v, 3) / std_dev(v).powi(3)
}

/// Excess kurtosis.
pub fn kurtosis(v: &[f64]) -> f64 {
    central_moment(v, 4) / variance(v).powi(2) - 3.0
}

/// `σ / μ`, keeping the sign of the mean.
pub fn coeff_var(v: &[f64]) -> f64 {
    std_dev(v) / mean(v)
}

/// Pearson correlation over the common prefix of `x` and `y`.
pub fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    let (x, y) = (&x[..n], &y[..n]);
    let (mx, my) = (mean(x), mean(y));
    let cov = x
        .iter()
        .zip_eq(y)
        .map(|(a, b)| (a - mx) * (b - my))
        .sum::<f64>()
        / n as f64;
    cov / (std_dev(x) * std_dev(y))
}

/// Mean of `|got − want| / |want|`; pairs with `want == 0` are skipped.
pub fn mean_relative_error(got: &[f64], want: &[f64]) -> f64 {
    let errors = izip!(got, want)
        .filter(|(_, w)| **w != 0.0)
        .map(|(g, w)| ((g - w) / w).abs())
        .collect_vec();
    if errors.is_empty() {
        return 0.0;
    }
    errors.iter().sum::<f64>() / errors.len() as f64
}

/// Mean of `|got − want|` over the common prefix.
pub fn mean_absolute_error(got: &[f64], want: &[f64]) -> f64 {
    let n = got.len().min(want.len());
    if n == 0 {
        return 0.0;
    }
    izip!(got, want).map(|(g, w)| (g - w).abs()).sum::<f64>() / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_moments() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&v), 5.0);
        assert_eq!(variance(&v), 4.0);
        assert_eq!(std_dev(&v), 2.0);
        assert_relative_eq!(coeff_var(&v), 0.4);
        assert_relative_eq!(skewness(&v), 0.65625);
        assert_relative_eq!(kurtosis(&v), 2.78125 - 3.0);
        let z = z_score_norm(&v);
        assert_relative_eq!(mean(&z), 0.0, epsilon = 1e-15);
        assert_relative_eq!(variance(&z), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_correlation() {
        let x = linspace(0.0, 10.0, 11);
        let y: Vec<f64> = x.iter().map(|v| 3.0 - 2.0 * v).collect();
        assert_relative_eq!(correlation(&x, &y), -1.0, epsilon = 1e-12);
        assert_relative_eq!(correlation(&x, &x), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_error_metrics() {
        let want = [1.0, 2.0, 0.0, 4.0];
        let got = [1.1, 1.8, 0.5, 4.0];
        assert_relative_eq!(mean_relative_error(&got, &want), 0.2 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(mean_absolute_error(&got, &want), 0.8 / 4.0, epsilon = 1e-12);
        assert_eq!(mean_relative_error(&[], &[]), 0.0);
    }
}
