//! Descriptive statistics for the paper figures
//!
//! One-way ANOVA across groups (per-lab metric comparisons), z-scoring for
//! the deviation-from-global-average panels, and the order statistics the
//! session summaries use.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::{Error, Result};

/// Result of a one-way ANOVA.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AnovaResult {
    /// F statistic (between-group over within-group variance)
    pub f_statistic: f64,
    /// Probability of an F at least this large under the null
    pub p_value: f64,
}

/// One-way ANOVA over two or more groups of observations.
///
/// # Errors
/// Returns error if fewer than two groups are given, any group is empty,
/// or the degrees of freedom are degenerate (all groups of size one).
pub fn f_oneway(groups: &[&[f64]]) -> Result<AnovaResult> {
    if groups.len() < 2 {
        return Err(Error::InsufficientData {
            context: "one-way ANOVA".to_string(),
            needed: 2,
            got: groups.len(),
        });
    }
    if let Some(empty_idx) = groups.iter().position(|g| g.is_empty()) {
        return Err(Error::InvalidInput(format!(
            "ANOVA group {empty_idx} is empty"
        )));
    }

    let n_total: usize = groups.iter().map(|g| g.len()).sum();
    let k = groups.len();
    if n_total <= k {
        return Err(Error::InvalidInput(
            "ANOVA needs more observations than groups".to_string(),
        ));
    }

    #[allow(clippy::cast_precision_loss)]
    let grand_mean =
        groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n_total as f64;

    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for group in groups {
        #[allow(clippy::cast_precision_loss)]
        let n = group.len() as f64;
        let mean = group.iter().sum::<f64>() / n;
        ss_between += n * (mean - grand_mean).powi(2);
        ss_within += group.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
    }

    #[allow(clippy::cast_precision_loss)]
    let df_between = (k - 1) as f64;
    #[allow(clippy::cast_precision_loss)]
    let df_within = (n_total - k) as f64;

    let ms_between = ss_between / df_between;
    let ms_within = ss_within / df_within;

    // identical groups: F is 0 by convention, p is 1
    if ms_within <= f64::EPSILON {
        if ms_between <= f64::EPSILON {
            return Ok(AnovaResult {
                f_statistic: 0.0,
                p_value: 1.0,
            });
        }
        return Ok(AnovaResult {
            f_statistic: f64::INFINITY,
            p_value: 0.0,
        });
    }

    let f_statistic = ms_between / ms_within;
    let dist = FisherSnedecor::new(df_between, df_within)
        .map_err(|e| Error::Other(format!("F-distribution setup failed: {e}")))?;
    let p_value = 1.0 - dist.cdf(f_statistic);

    Ok(AnovaResult {
        f_statistic,
        p_value,
    })
}

/// Z-score a sample (population standard deviation, as `scipy.stats.zscore`).
///
/// A zero-variance sample maps to all zeros.
#[must_use]
pub fn zscore(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let sd = var.sqrt();
    if sd <= f64::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|x| (x - mean) / sd).collect()
}

/// Median of a sample. NaN on an empty slice.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

/// Percentile with linear interpolation between order statistics.
///
/// `q` is in percent (0..=100). NaN on an empty slice.
#[must_use]
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss)]
    let rank = (q / 100.0) * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = rank - rank.floor();
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f_oneway_identical_groups() {
        let g = [1.0, 2.0, 3.0];
        let result = f_oneway(&[&g, &g, &g]).unwrap();
        assert!(result.f_statistic.abs() < 1e-12);
        assert!((result.p_value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_f_oneway_separated_groups() {
        let a = [1.0, 1.1, 0.9, 1.0];
        let b = [5.0, 5.1, 4.9, 5.0];
        let result = f_oneway(&[&a, &b]).unwrap();
        assert!(result.f_statistic > 100.0);
        assert!(result.p_value < 0.001);
    }

    #[test]
    fn test_f_oneway_rejects_single_group() {
        let a = [1.0, 2.0];
        assert!(f_oneway(&[&a]).is_err());
    }

    #[test]
    fn test_zscore_mean_zero_unit_sd() {
        let z = zscore(&[2.0, 4.0, 6.0, 8.0]);
        let mean: f64 = z.iter().sum::<f64>() / 4.0;
        let var: f64 = z.iter().map(|x| x * x).sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_median_interpolates() {
        assert!((median(&[1.0, 2.0, 3.0, 4.0]) - 2.5).abs() < 1e-12);
        assert!((median(&[3.0, 1.0, 2.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_bounds() {
        let v = [1.0, 2.0, 3.0];
        assert!((percentile(&v, 0.0) - 1.0).abs() < 1e-12);
        assert!((percentile(&v, 100.0) - 3.0).abs() < 1e-12);
    }
}
