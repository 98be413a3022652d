//! Spike-sorting unit-quality metrics
//!
//! Per-unit statistics computed from spike times, amplitudes, and depths:
//! refractory-period violations and the Hill et al. (2011) false-positive
//! estimate derived from them, electrode drift, firing-rate stability, the
//! fraction of spikes lost below the detection threshold, and waveform
//! stability between the early and late parts of the recording.
//!
//! Units are processed in parallel. A unit that cannot be scored (no
//! spikes) is logged and reported with NaN sentinels rather than aborting
//! the batch; downstream filtering treats NaN as failing every gate.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::stats;
use crate::{Error, Result};

/// Bin count of the amplitude histogram behind [`fraction_missing`].
const AMP_HISTOGRAM_BINS: usize = 500;

/// Spike train of one sorted unit.
///
/// Spikes are kept sorted by time; amplitudes are in microvolts and depths
/// in micrometers along the probe.
#[derive(Debug, Clone)]
pub struct UnitSpikes {
    unit_id: u64,
    times: Vec<f64>,
    amps: Vec<f64>,
    depths: Vec<f64>,
    waveform_early: Option<Array2<f64>>,
    waveform_late: Option<Array2<f64>>,
}

impl UnitSpikes {
    /// Create a unit from parallel spike vectors, sorting by time.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the vectors differ in length.
    pub fn new(unit_id: u64, times: Vec<f64>, amps: Vec<f64>, depths: Vec<f64>) -> Result<Self> {
        if times.len() != amps.len() || times.len() != depths.len() {
            return Err(Error::InvalidInput(format!(
                "Unit {unit_id}: spike vectors differ in length ({}/{}/{})",
                times.len(),
                amps.len(),
                depths.len()
            )));
        }

        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by(|&a, &b| times[a].total_cmp(&times[b]));
        let times: Vec<f64> = order.iter().map(|&i| times[i]).collect();
        let amps: Vec<f64> = order.iter().map(|&i| amps[i]).collect();
        let depths: Vec<f64> = order.iter().map(|&i| depths[i]).collect();

        Ok(Self {
            unit_id,
            times,
            amps,
            depths,
            waveform_early: None,
            waveform_late: None,
        })
    }

    /// Attach mean waveforms (channels x samples) from the first and last
    /// parts of the recording, for the stability metric.
    #[must_use]
    pub fn with_waveforms(mut self, early: Array2<f64>, late: Array2<f64>) -> Self {
        self.waveform_early = Some(early);
        self.waveform_late = Some(late);
        self
    }

    /// Unit ID.
    #[must_use]
    pub const fn unit_id(&self) -> u64 {
        self.unit_id
    }

    /// Number of spikes.
    #[must_use]
    pub fn n_spikes(&self) -> usize {
        self.times.len()
    }

    /// Spike times in seconds, sorted.
    #[must_use]
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Spike amplitudes in microvolts, in time order.
    #[must_use]
    pub fn amps(&self) -> &[f64] {
        &self.amps
    }

    /// Spike depths in micrometers, in time order.
    #[must_use]
    pub fn depths(&self) -> &[f64] {
        &self.depths
    }
}

/// Parameters of the quality metrics and the unit filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QualityParams {
    /// Refractory period in seconds
    pub refractory_period: f64,
    /// Chunks the smoothed rate series is averaged into for the CV
    pub n_cv_bins: usize,
    /// Firing-rate sliding-window width in seconds
    pub fr_win: f64,
    /// Firing-rate sliding-window step in seconds
    pub fr_step: f64,
    /// Spikes per bin for the drift estimates
    pub spks_per_bin: usize,
    /// Gaussian smoothing sigma, in samples, for histograms and rate series
    pub smooth_sigma: f64,
    /// Minimum median amplitude (microvolts) a unit must reach
    pub min_amp: f64,
    /// Minimum mean firing rate (Hz) a unit must reach
    pub min_fr: f64,
    /// Maximum tolerated false-positive rate
    pub max_fpr: f64,
}

impl Default for QualityParams {
    fn default() -> Self {
        Self {
            refractory_period: 0.002,
            n_cv_bins: 10,
            fr_win: 10.0,
            fr_step: 1.0,
            spks_per_bin: 20,
            smooth_sigma: 5.0,
            min_amp: 50.0,
            min_fr: 0.2,
            max_fpr: 0.1,
        }
    }
}

/// Quality metrics of one unit. NaN marks a metric that could not be
/// computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UnitMetrics {
    /// Unit ID
    pub unit_id: u64,
    /// Number of spikes
    pub n_spikes: usize,
    /// Mean firing rate over the recording, Hz
    pub firing_rate: f64,
    /// Median spike amplitude, microvolts
    pub amp_median: f64,
    /// Fraction of inter-spike intervals shorter than the refractory period
    pub isi_viol: f64,
    /// Estimated false-positive rate (Hill et al. 2011)
    pub false_positive_rate: f64,
    /// Largest excursion of the binned median depth, micrometers
    pub max_drift: f64,
    /// Total path length of the binned median depth, micrometers
    pub cum_drift: f64,
    /// Coefficient of variation of the firing rate over sliding windows
    pub cv_firing_rate: f64,
    /// Estimated fraction of spikes below the detection threshold
    pub fraction_missing: f64,
    /// Correlation between early and late mean waveforms
    pub wf_similarity: f64,
}

impl UnitMetrics {
    /// All-NaN record for a unit that could not be scored.
    #[must_use]
    pub const fn sentinel(unit_id: u64) -> Self {
        Self {
            unit_id,
            n_spikes: 0,
            firing_rate: f64::NAN,
            amp_median: f64::NAN,
            isi_viol: f64::NAN,
            false_positive_rate: f64::NAN,
            max_drift: f64::NAN,
            cum_drift: f64::NAN,
            cv_firing_rate: f64::NAN,
            fraction_missing: f64::NAN,
            wf_similarity: f64::NAN,
        }
    }
}

/// Fraction of inter-spike intervals shorter than `refractory_period`.
///
/// NaN with fewer than two spikes.
#[must_use]
pub fn isi_violations(times: &[f64], refractory_period: f64) -> f64 {
    if times.len() < 2 {
        return f64::NAN;
    }
    let violations = times
        .windows(2)
        .filter(|w| w[1] - w[0] < refractory_period)
        .count();
    #[allow(clippy::cast_precision_loss)]
    {
        violations as f64 / (times.len() - 1) as f64
    }
}

/// False-positive rate estimate from refractory violations (Hill et al.
/// 2011).
///
/// Solves the quadratic relating the observed violation count to the
/// contamination rate; a violation count too high for any solution maps
/// to 1.0. NaN with fewer than two spikes or a degenerate duration.
#[must_use]
pub fn false_positive_rate(times: &[f64], refractory_period: f64) -> f64 {
    if times.len() < 2 {
        return f64::NAN;
    }
    let duration = times[times.len() - 1] - times[0];
    if duration <= 0.0 {
        return f64::NAN;
    }
    let violations = times
        .windows(2)
        .filter(|w| w[1] - w[0] < refractory_period)
        .count();
    #[allow(clippy::cast_precision_loss)]
    let n = times.len() as f64;
    #[allow(clippy::cast_precision_loss)]
    let c = violations as f64 * duration / (2.0 * refractory_period * n * n);

    let discriminant = 1.0 - 4.0 * c;
    if discriminant < 0.0 {
        1.0
    } else {
        (1.0 - discriminant.sqrt()) / 2.0
    }
}

/// Median depth per bin of `spks_per_bin` consecutive spikes.
fn binned_depths(depths: &[f64], spks_per_bin: usize) -> Vec<f64> {
    depths
        .chunks(spks_per_bin.max(1))
        .filter(|chunk| chunk.len() == spks_per_bin.max(1))
        .map(stats::median)
        .collect()
}

/// Largest excursion of the binned median depth.
///
/// NaN with fewer than two full bins.
#[must_use]
pub fn max_drift(depths: &[f64], spks_per_bin: usize) -> f64 {
    let bins = binned_depths(depths, spks_per_bin);
    if bins.len() < 2 {
        return f64::NAN;
    }
    let min = bins.iter().copied().fold(f64::INFINITY, f64::min);
    let max = bins.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    max - min
}

/// Total path length of the binned median depth.
///
/// Always at least [`max_drift`]; NaN with fewer than two full bins.
#[must_use]
pub fn cum_drift(depths: &[f64], spks_per_bin: usize) -> f64 {
    let bins = binned_depths(depths, spks_per_bin);
    if bins.len() < 2 {
        return f64::NAN;
    }
    bins.windows(2).map(|w| (w[1] - w[0]).abs()).sum()
}

/// Coefficient of variation of the firing rate over sliding windows.
///
/// Window counts are smoothed, averaged into `n_cv_bins` chunks, and the
/// chunk means' standard deviation is divided by their mean. NaN when the
/// recording is shorter than one window or the mean rate is zero.
#[must_use]
pub fn firing_rate_cv(times: &[f64], params: &QualityParams) -> f64 {
    if times.len() < 2 || params.fr_win <= 0.0 || params.fr_step <= 0.0 {
        return f64::NAN;
    }
    let t0 = times[0];
    let t1 = times[times.len() - 1];
    if t1 - t0 < params.fr_win {
        return f64::NAN;
    }

    let mut rates = Vec::new();
    let mut start = t0;
    while start + params.fr_win <= t1 {
        let end = start + params.fr_win;
        let lo = times.partition_point(|&t| t < start);
        let hi = times.partition_point(|&t| t < end);
        #[allow(clippy::cast_precision_loss)]
        rates.push((hi - lo) as f64 / params.fr_win);
        start += params.fr_step;
    }
    if rates.len() < 2 {
        return f64::NAN;
    }

    let smoothed = gaussian_smooth(&rates, params.smooth_sigma);
    let chunks = params.n_cv_bins.clamp(1, smoothed.len());
    let chunk_len = smoothed.len().div_ceil(chunks);
    let means: Vec<f64> = smoothed
        .chunks(chunk_len)
        .map(|c| {
            #[allow(clippy::cast_precision_loss)]
            {
                c.iter().sum::<f64>() / c.len() as f64
            }
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let n = means.len() as f64;
    let mean = means.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return f64::NAN;
    }
    let var = means.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / n;
    var.sqrt() / mean
}

/// Estimated fraction of spikes lost below the detection threshold.
///
/// Assumes a symmetric amplitude distribution: the histogram is smoothed,
/// and the mass beyond the point mirroring the low-amplitude edge around
/// the mode is taken as missing. Capped at 0.5 (beyond that the symmetry
/// assumption says nothing). NaN on an empty unit or constant amplitudes.
#[must_use]
pub fn fraction_missing(amps: &[f64], smooth_sigma: f64) -> f64 {
    if amps.is_empty() {
        return f64::NAN;
    }
    let min = amps.iter().copied().fold(f64::INFINITY, f64::min);
    let max = amps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(max - min).is_finite() || max - min <= 0.0 {
        return f64::NAN;
    }

    let mut counts = vec![0.0f64; AMP_HISTOGRAM_BINS];
    #[allow(clippy::cast_precision_loss)]
    let scale = AMP_HISTOGRAM_BINS as f64 / (max - min);
    for &a in amps {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bin = (((a - min) * scale) as usize).min(AMP_HISTOGRAM_BINS - 1);
        counts[bin] += 1.0;
    }
    let pdf = gaussian_smooth(&counts, smooth_sigma);

    let peak = pdf
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i);

    // mirror point: where the upper tail first falls back to the height of
    // the lower edge
    let edge = pdf[0];
    let mirror = (peak..pdf.len())
        .min_by(|&a, &b| (pdf[a] - edge).abs().total_cmp(&(pdf[b] - edge).abs()))
        .unwrap_or(peak);

    let total: f64 = pdf.iter().sum();
    let tail: f64 = pdf[mirror..].iter().sum();
    (tail / total).min(0.5)
}

/// Correlation between the early and late mean waveforms.
///
/// Both arrays are flattened and Pearson-correlated; identical shapes are
/// required. NaN if either waveform is missing, shapes differ, or either
/// is flat.
#[must_use]
pub fn wf_similarity(early: Option<&Array2<f64>>, late: Option<&Array2<f64>>) -> f64 {
    let (Some(early), Some(late)) = (early, late) else {
        return f64::NAN;
    };
    if early.dim() != late.dim() || early.is_empty() {
        return f64::NAN;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = early.len() as f64;
    let mean_e = early.sum() / n;
    let mean_l = late.sum() / n;

    let mut cov = 0.0;
    let mut var_e = 0.0;
    let mut var_l = 0.0;
    for (e, l) in early.iter().zip(late.iter()) {
        let de = e - mean_e;
        let dl = l - mean_l;
        cov += de * dl;
        var_e += de * de;
        var_l += dl * dl;
    }
    if var_e <= f64::EPSILON || var_l <= f64::EPSILON {
        return f64::NAN;
    }
    cov / (var_e.sqrt() * var_l.sqrt())
}

/// Score every unit, in parallel.
///
/// A unit with no spikes is logged and reported as a NaN sentinel record;
/// the batch never aborts.
#[must_use]
pub fn compute_unit_metrics(units: &[UnitSpikes], params: &QualityParams) -> Vec<UnitMetrics> {
    units
        .par_iter()
        .map(|unit| {
            if unit.n_spikes() == 0 {
                warn!(unit_id = unit.unit_id, "unit has no spikes, emitting sentinels");
                return UnitMetrics::sentinel(unit.unit_id);
            }

            let duration = unit.times[unit.times.len() - 1] - unit.times[0];
            #[allow(clippy::cast_precision_loss)]
            let firing_rate = if duration > 0.0 {
                unit.times.len() as f64 / duration
            } else {
                f64::NAN
            };

            UnitMetrics {
                unit_id: unit.unit_id,
                n_spikes: unit.n_spikes(),
                firing_rate,
                amp_median: stats::median(&unit.amps),
                isi_viol: isi_violations(&unit.times, params.refractory_period),
                false_positive_rate: false_positive_rate(
                    &unit.times,
                    params.refractory_period,
                ),
                max_drift: max_drift(&unit.depths, params.spks_per_bin),
                cum_drift: cum_drift(&unit.depths, params.spks_per_bin),
                cv_firing_rate: firing_rate_cv(&unit.times, params),
                fraction_missing: fraction_missing(&unit.amps, params.smooth_sigma),
                wf_similarity: wf_similarity(
                    unit.waveform_early.as_ref(),
                    unit.waveform_late.as_ref(),
                ),
            }
        })
        .collect()
}

/// The amplitude / rate / contamination gate.
///
/// Returns one flag per unit: true when the unit's median amplitude, mean
/// firing rate, and estimated false-positive rate all clear the
/// thresholds. NaN fails every comparison, so sentinel units never pass.
#[must_use]
pub fn filter_units(metrics: &[UnitMetrics], params: &QualityParams) -> Vec<bool> {
    metrics
        .iter()
        .map(|m| {
            m.amp_median >= params.min_amp
                && m.firing_rate >= params.min_fr
                && m.false_positive_rate <= params.max_fpr
        })
        .collect()
}

/// Gaussian smoothing with a truncated, edge-renormalized kernel.
///
/// `sigma` is in samples; a non-positive sigma returns the input.
fn gaussian_smooth(values: &[f64], sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 || values.is_empty() {
        return values.to_vec();
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let radius = (3.0 * sigma).ceil() as usize;
    #[allow(clippy::cast_precision_loss)]
    let kernel: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let d = i as f64 - radius as f64;
            (-d * d / (2.0 * sigma * sigma)).exp()
        })
        .collect();

    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let mut acc = 0.0;
            let mut norm = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                #[allow(clippy::cast_possible_wrap)]
                let offset = i as i64 + k as i64 - radius as i64;
                #[allow(clippy::cast_possible_wrap)]
                if offset < 0 || offset >= values.len() as i64 {
                    continue;
                }
                #[allow(clippy::cast_sign_loss)]
                let idx = offset as usize;
                acc += weight * values[idx];
                norm += weight;
            }
            acc / norm
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use statrs::distribution::{ContinuousCDF, Normal};

    /// Regular spike train: `n` spikes spaced `isi` seconds apart.
    fn regular_train(n: usize, isi: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 * isi).collect()
    }

    /// Deterministic Gaussian-ish sample via inverse-CDF quantiles.
    fn gaussian_sample(n: usize, mean: f64, sd: f64) -> Vec<f64> {
        let dist = Normal::new(mean, sd).unwrap();
        (1..=n)
            .map(|i| dist.inverse_cdf(i as f64 / (n + 1) as f64))
            .collect()
    }

    fn unit(times: Vec<f64>) -> UnitSpikes {
        let n = times.len();
        UnitSpikes::new(0, times, vec![100.0; n], vec![1000.0; n]).unwrap()
    }

    #[test]
    fn test_refractory_train_has_no_violations() {
        let times = regular_train(500, 0.003);
        assert!(isi_violations(&times, 0.002).abs() < f64::EPSILON);
        assert!(false_positive_rate(&times, 0.002).abs() < f64::EPSILON);
    }

    #[test]
    fn test_injected_violations_are_counted() {
        let mut times = regular_train(100, 0.010);
        // five doublets 1 ms after an existing spike
        for i in 0..5 {
            times.push(times[i * 10] + 0.001);
        }
        times.sort_by(f64::total_cmp);
        let frac = isi_violations(&times, 0.002);
        assert!((frac - 5.0 / 104.0).abs() < 1e-12);
        let fpr = false_positive_rate(&times, 0.002);
        assert!(fpr > 0.0 && fpr < 1.0);
    }

    #[test]
    fn test_monotonic_depth_drift() {
        let depths: Vec<f64> = (0..200).map(f64::from).collect();
        let md = max_drift(&depths, 20);
        let cd = cum_drift(&depths, 20);
        // bin medians run 9.5 to 189.5
        assert!((md - 180.0).abs() < 1e-9);
        assert!((cd - 180.0).abs() < 1e-9);
        assert!(cd >= md);
    }

    #[test]
    fn test_wandering_depth_cum_exceeds_max() {
        // down then back up: net excursion small, path long
        let mut depths: Vec<f64> = (0..100).map(f64::from).collect();
        depths.extend((0..100).rev().map(f64::from));
        let md = max_drift(&depths, 20);
        let cd = cum_drift(&depths, 20);
        assert!(cd > md + 1.0);
    }

    #[test]
    fn test_firing_rate_cv_stable_vs_stepped() {
        let params = QualityParams::default();
        let stable = regular_train(2000, 0.05);
        let cv_stable = firing_rate_cv(&stable, &params);
        assert!(cv_stable < 0.05, "stable train CV was {cv_stable}");

        // rate doubles halfway through
        let mut stepped = regular_train(1000, 0.1);
        let t_half = stepped[stepped.len() - 1];
        stepped.extend((0..2000).map(|i| t_half + 0.05 + f64::from(i) * 0.05));
        let cv_stepped = firing_rate_cv(&stepped, &params);
        assert!(cv_stepped > 0.2, "stepped train CV was {cv_stepped}");
    }

    #[test]
    fn test_fraction_missing_symmetric_vs_truncated() {
        let full = gaussian_sample(5000, 200.0, 30.0);
        let missing_full = fraction_missing(&full, 5.0);
        assert!(missing_full < 0.1, "symmetric sample gave {missing_full}");

        let truncated: Vec<f64> = full.iter().copied().filter(|&a| a >= 200.0).collect();
        let missing_trunc = fraction_missing(&truncated, 5.0);
        assert!(missing_trunc > 0.3, "truncated sample gave {missing_trunc}");
        assert!(missing_trunc <= 0.5);
    }

    #[test]
    fn test_wf_similarity_extremes() {
        let wf = array![[0.0, 1.0, -2.0], [3.0, 0.5, -1.0]];
        let inverted = wf.mapv(|v| -v);
        assert!((wf_similarity(Some(&wf), Some(&wf)) - 1.0).abs() < 1e-12);
        assert!(wf_similarity(Some(&wf), Some(&inverted)) < -0.99);
        assert!(wf_similarity(Some(&wf), None).is_nan());
    }

    #[test]
    fn test_empty_unit_yields_sentinels() {
        let empty = UnitSpikes::new(7, vec![], vec![], vec![]).unwrap();
        let metrics = compute_unit_metrics(&[empty], &QualityParams::default());
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].unit_id, 7);
        assert_eq!(metrics[0].n_spikes, 0);
        assert!(metrics[0].firing_rate.is_nan());
        assert!(metrics[0].isi_viol.is_nan());
    }

    #[test]
    fn test_filter_units_gate() {
        let params = QualityParams::default();
        let good = UnitMetrics {
            unit_id: 1,
            n_spikes: 1000,
            firing_rate: 5.0,
            amp_median: 120.0,
            isi_viol: 0.001,
            false_positive_rate: 0.01,
            max_drift: 10.0,
            cum_drift: 20.0,
            cv_firing_rate: 0.2,
            fraction_missing: 0.05,
            wf_similarity: 0.95,
        };
        let quiet = UnitMetrics {
            firing_rate: 0.05,
            ..good
        };
        let contaminated = UnitMetrics {
            false_positive_rate: 0.4,
            ..good
        };
        let sentinel = UnitMetrics::sentinel(9);

        let kept = filter_units(&[good, quiet, contaminated, sentinel], &params);
        assert_eq!(kept, vec![true, false, false, false]);
    }

    #[test]
    fn test_unit_spikes_sorts_and_validates() {
        let unit = UnitSpikes::new(
            3,
            vec![2.0, 0.0, 1.0],
            vec![30.0, 10.0, 20.0],
            vec![300.0, 100.0, 200.0],
        )
        .unwrap();
        assert_eq!(unit.times(), &[0.0, 1.0, 2.0]);
        assert_eq!(unit.amps(), &[10.0, 20.0, 30.0]);

        assert!(UnitSpikes::new(4, vec![0.0], vec![], vec![0.0]).is_err());
    }

    #[test]
    fn test_fractions_stay_in_unit_interval() {
        let times = regular_train(300, 0.004);
        let amps = gaussian_sample(300, 150.0, 20.0);
        let frac = fraction_missing(&amps, 5.0);
        let viol = isi_violations(&times, 0.002);
        let fpr = false_positive_rate(&times, 0.002);
        for v in [frac, viol, fpr] {
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
