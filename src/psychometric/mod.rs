//! Psychometric curve fitting
//!
//! Maximum-likelihood fit of the 4-parameter erf sigmoid used throughout
//! the behavioral pipeline: bias, threshold, and two lapse rates. The fit
//! refuses to run below 5 distinct signed-contrast levels; coarse sessions
//! are plotted as raw fractions instead.
//!
//! ## Example
//!
//! ```rust
//! use ethogram::behavior::ContrastSummary;
//! use ethogram::psychometric::{erf_psycho_2gammas, mle_fit, FitBounds, PsychoParams};
//!
//! let truth = PsychoParams { bias: 5.0, threshold: 25.0, lapse_low: 0.05, lapse_high: 0.05 };
//! let data: Vec<ContrastSummary> = [-100.0, -50.0, -12.0, 0.0, 12.0, 50.0, 100.0]
//!     .iter()
//!     .map(|&c| ContrastSummary {
//!         signed_contrast: c,
//!         n_trials: 200,
//!         fraction_right: erf_psycho_2gammas(&truth, c),
//!     })
//!     .collect();
//! let fit = mle_fit(&data, &FitBounds::from_data(&data).unwrap()).unwrap();
//! assert!((fit.params.bias - truth.bias).abs() < 5.0);
//! ```

mod optim;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;
use tracing::debug;

use crate::behavior::ContrastSummary;
use crate::{Error, Result};

/// Minimum number of distinct signed-contrast levels required for a fit.
pub const MIN_CONTRAST_LEVELS: usize = 5;

/// Likelihood floor keeping log terms finite during the search.
const P_FLOOR: f64 = 1e-9;

/// Parameters of the 4-parameter erf psychometric function.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PsychoParams {
    /// Horizontal shift of the curve, in percent contrast
    pub bias: f64,
    /// Slope parameter, in percent contrast
    pub threshold: f64,
    /// Lower asymptotic error rate (lapses at strong leftward stimuli)
    pub lapse_low: f64,
    /// Upper asymptotic error rate (lapses at strong rightward stimuli)
    pub lapse_high: f64,
}

impl PsychoParams {
    fn from_slice(x: &[f64]) -> Self {
        Self {
            bias: x[0],
            threshold: x[1],
            lapse_low: x[2],
            lapse_high: x[3],
        }
    }

    const fn to_array(self) -> [f64; 4] {
        [self.bias, self.threshold, self.lapse_low, self.lapse_high]
    }
}

/// Evaluate the erf psychometric function with two lapse rates.
///
/// Returns the probability of a rightward choice at signed contrast `x`
/// (percent).
#[must_use]
pub fn erf_psycho_2gammas(params: &PsychoParams, x: f64) -> f64 {
    params.lapse_low
        + (1.0 - params.lapse_low - params.lapse_high)
            * 0.5
            * (1.0 + erf((x - params.bias) / params.threshold))
}

/// Box constraints and start point for the psychometric fit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FitBounds {
    /// Initial parameter guess
    pub start: PsychoParams,
    /// Elementwise lower bounds
    pub min: PsychoParams,
    /// Elementwise upper bounds
    pub max: PsychoParams,
}

impl FitBounds {
    /// Default bounds derived from the data, matching the pipeline's fixed
    /// choices: bias starts at the mean contrast and is bounded by the
    /// observed contrast range; threshold starts at 20 and may reach 100;
    /// lapses start at 0.05 in `[0, 1]`.
    ///
    /// # Errors
    /// Returns `InsufficientData` on an empty summary.
    pub fn from_data(data: &[ContrastSummary]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InsufficientData {
                context: "fit bounds".to_string(),
                needed: 1,
                got: 0,
            });
        }
        #[allow(clippy::cast_precision_loss)]
        let mean =
            data.iter().map(|d| d.signed_contrast).sum::<f64>() / data.len() as f64;
        let min = data
            .iter()
            .map(|d| d.signed_contrast)
            .fold(f64::INFINITY, f64::min);
        let max = data
            .iter()
            .map(|d| d.signed_contrast)
            .fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            start: PsychoParams {
                bias: mean,
                threshold: 20.0,
                lapse_low: 0.05,
                lapse_high: 0.05,
            },
            min: PsychoParams {
                bias: min,
                threshold: 0.0,
                lapse_low: 0.0,
                lapse_high: 0.0,
            },
            max: PsychoParams {
                bias: max,
                threshold: 100.0,
                lapse_low: 1.0,
                lapse_high: 1.0,
            },
        })
    }
}

/// A completed psychometric fit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PsychoFit {
    /// Fitted parameters
    pub params: PsychoParams,
    /// Log-likelihood of the data at the fitted parameters
    pub log_likelihood: f64,
}

/// Fit the psychometric function by maximum likelihood.
///
/// Each [`ContrastSummary`] contributes a binomial likelihood term: `n`
/// trials with the observed rightward fraction. The negative log-likelihood
/// is minimized by a bounded simplex search inside `bounds`.
///
/// # Errors
/// Returns:
/// - `InsufficientData` when fewer than [`MIN_CONTRAST_LEVELS`] distinct
///   contrast levels are present
/// - `InvalidInput` when the bounds are inconsistent
/// - `Fit` when the search fails to converge
pub fn mle_fit(data: &[ContrastSummary], bounds: &FitBounds) -> Result<PsychoFit> {
    if data.len() < MIN_CONTRAST_LEVELS {
        return Err(Error::InsufficientData {
            context: "psychometric fit".to_string(),
            needed: MIN_CONTRAST_LEVELS,
            got: data.len(),
        });
    }

    let start = bounds.start.to_array();
    let lower = bounds.min.to_array();
    let upper = bounds.max.to_array();
    for i in 0..4 {
        if !(lower[i] <= start[i] && start[i] <= upper[i]) {
            return Err(Error::InvalidInput(format!(
                "Fit start point outside bounds at parameter {i}"
            )));
        }
    }

    let neg_log_likelihood = |x: &[f64]| -> f64 {
        let params = PsychoParams::from_slice(x);
        let mut nll = 0.0;
        for point in data {
            let p = erf_psycho_2gammas(&params, point.signed_contrast)
                .clamp(P_FLOOR, 1.0 - P_FLOOR);
            #[allow(clippy::cast_precision_loss)]
            let n = point.n_trials as f64;
            let k = n * point.fraction_right;
            nll -= k * p.ln() + (n - k) * (1.0 - p).ln();
        }
        nll
    };

    let (best, nll) =
        optim::minimize_bounded(neg_log_likelihood, &start, &lower, &upper, 2000, 1e-9).map_err(
            |e| Error::Fit {
                model: "psychometric".to_string(),
                reason: e.to_string(),
            },
        )?;

    let fit = PsychoFit {
        params: PsychoParams::from_slice(&best),
        log_likelihood: -nll,
    };
    debug!(
        bias = fit.params.bias,
        threshold = fit.params.threshold,
        "psychometric fit converged"
    );
    Ok(fit)
}

/// Concurrent cache of psychometric fits keyed by session ID.
///
/// The training criteria re-fit pooled windows of the same sessions many
/// times across subjects; caching the per-session fits keeps the
/// classification pass linear.
#[derive(Debug, Default)]
pub struct FitCache {
    fits: DashMap<String, PsychoFit>,
}

impl FitCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached fits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fits.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fits.is_empty()
    }

    /// Fetch the fit for a session, computing and caching it on a miss.
    ///
    /// # Errors
    /// Propagates [`mle_fit`] errors; failures are not cached.
    pub fn get_or_fit(
        &self,
        session_id: &str,
        data: &[ContrastSummary],
        bounds: &FitBounds,
    ) -> Result<PsychoFit> {
        if let Some(hit) = self.fits.get(session_id) {
            return Ok(*hit);
        }
        let fit = mle_fit(data, bounds)?;
        self.fits.insert(session_id.to_string(), fit);
        Ok(fit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(truth: &PsychoParams, contrasts: &[f64], n: usize) -> Vec<ContrastSummary> {
        contrasts
            .iter()
            .map(|&c| ContrastSummary {
                signed_contrast: c,
                n_trials: n,
                fraction_right: erf_psycho_2gammas(truth, c),
            })
            .collect()
    }

    const CONTRASTS: [f64; 9] = [-100.0, -50.0, -25.0, -12.0, 0.0, 12.0, 25.0, 50.0, 100.0];

    #[test]
    fn test_sigmoid_asymptotes() {
        let p = PsychoParams {
            bias: 0.0,
            threshold: 15.0,
            lapse_low: 0.1,
            lapse_high: 0.2,
        };
        assert!((erf_psycho_2gammas(&p, -1e4) - 0.1).abs() < 1e-6);
        assert!((erf_psycho_2gammas(&p, 1e4) - 0.8).abs() < 1e-6);
        assert!((erf_psycho_2gammas(&p, 0.0) - (0.1 + 0.7 / 2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_fit_recovers_noiseless_parameters() {
        let truth = PsychoParams {
            bias: 8.0,
            threshold: 22.0,
            lapse_low: 0.04,
            lapse_high: 0.07,
        };
        let data = synthetic(&truth, &CONTRASTS, 500);
        let bounds = FitBounds::from_data(&data).unwrap();
        let fit = mle_fit(&data, &bounds).unwrap();

        assert!((fit.params.bias - truth.bias).abs() < 2.0);
        assert!((fit.params.threshold - truth.threshold).abs() < 3.0);
        assert!((fit.params.lapse_low - truth.lapse_low).abs() < 0.03);
        assert!((fit.params.lapse_high - truth.lapse_high).abs() < 0.03);
    }

    #[test]
    fn test_fit_refuses_coarse_data() {
        let truth = PsychoParams {
            bias: 0.0,
            threshold: 20.0,
            lapse_low: 0.05,
            lapse_high: 0.05,
        };
        let data = synthetic(&truth, &[-100.0, -50.0, 50.0, 100.0], 100);
        let bounds = FitBounds::from_data(&data).unwrap();
        let err = mle_fit(&data, &bounds).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { .. }));
    }

    #[test]
    fn test_fitted_params_stay_in_bounds() {
        let truth = PsychoParams {
            bias: 0.0,
            threshold: 10.0,
            lapse_low: 0.0,
            lapse_high: 0.0,
        };
        let data = synthetic(&truth, &CONTRASTS, 50);
        let bounds = FitBounds::from_data(&data).unwrap();
        let fit = mle_fit(&data, &bounds).unwrap();
        assert!(fit.params.threshold >= bounds.min.threshold);
        assert!(fit.params.threshold <= bounds.max.threshold);
        assert!(fit.params.lapse_low >= 0.0 && fit.params.lapse_low <= 1.0);
    }

    #[test]
    fn test_fit_cache_hits() {
        let truth = PsychoParams {
            bias: 0.0,
            threshold: 20.0,
            lapse_low: 0.05,
            lapse_high: 0.05,
        };
        let data = synthetic(&truth, &CONTRASTS, 100);
        let bounds = FitBounds::from_data(&data).unwrap();
        let cache = FitCache::new();
        let first = cache.get_or_fit("sess-1", &data, &bounds).unwrap();
        let second = cache.get_or_fit("sess-1", &data, &bounds).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }
}
