//! Behavioral feature extraction
//!
//! Per-session and per-contrast aggregation of raw trial records: the
//! choice-fraction table the psychometric fit consumes, and the scalar
//! session summaries the training criteria consume.
//!
//! Sign convention throughout: positive signed contrast means the stimulus
//! was on the right, and the reported fraction is the fraction of rightward
//! choices. No-go trials carry no choice and are excluded from choice
//! fractions (but still count toward session trial totals).

use serde::{Deserialize, Serialize};

use crate::schema::TrialRecord;
use crate::stats;
use crate::{Error, Result};

/// Absolute signed contrast (in percent) at or above which a trial counts
/// as "easy" for the performance-at-easy-contrasts summary.
pub const EASY_CONTRAST_THRESHOLD: f64 = 50.0;

/// Choice statistics at one signed-contrast level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ContrastSummary {
    /// Signed contrast in percent (positive = rightward stimulus)
    pub signed_contrast: f64,
    /// Number of responded (non-no-go) trials at this level
    pub n_trials: usize,
    /// Fraction of rightward choices among responded trials
    pub fraction_right: f64,
}

/// Scalar summary of one session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    /// Total trial count, no-go included
    pub n_trials: usize,
    /// Fraction of trials with positive feedback
    pub performance: f64,
    /// Fraction correct among easy trials (|contrast| >= 50%), NaN if none
    pub performance_easy: f64,
    /// Median reaction time in seconds, NaN if no responded trials
    pub median_reaction_time: f64,
    /// Fraction of rightward choices among responded trials, NaN if none
    pub rightward_bias: f64,
}

/// Group responded trials by signed contrast.
///
/// Returns one [`ContrastSummary`] per distinct signed-contrast level,
/// sorted by contrast. Levels are matched exactly; the task uses a fixed
/// contrast set so no binning is needed.
///
/// # Errors
/// Returns `InsufficientData` if no trial carries a response.
pub fn summarize_by_contrast(trials: &[TrialRecord]) -> Result<Vec<ContrastSummary>> {
    let mut levels: Vec<(f64, usize, usize)> = Vec::new();

    for trial in trials {
        let Some(chose_right) = trial.chose_right() else {
            continue;
        };
        let contrast = trial.signed_contrast();
        let entry = levels
            .iter_mut()
            .find(|(c, _, _)| (*c - contrast).abs() < f64::EPSILON);
        match entry {
            Some((_, n, n_right)) => {
                *n += 1;
                if chose_right {
                    *n_right += 1;
                }
            }
            None => levels.push((contrast, 1, usize::from(chose_right))),
        }
    }

    if levels.is_empty() {
        return Err(Error::InsufficientData {
            context: "contrast summary".to_string(),
            needed: 1,
            got: 0,
        });
    }

    levels.sort_by(|a, b| a.0.total_cmp(&b.0));
    #[allow(clippy::cast_precision_loss)]
    Ok(levels
        .into_iter()
        .map(|(signed_contrast, n, n_right)| ContrastSummary {
            signed_contrast,
            n_trials: n,
            fraction_right: n_right as f64 / n as f64,
        })
        .collect())
}

/// Median reaction time per signed-contrast level among responded trials,
/// sorted by contrast. The chronometric companion of
/// [`summarize_by_contrast`].
///
/// # Errors
/// Returns `InsufficientData` if no trial carries a response.
pub fn chronometric_by_contrast(trials: &[TrialRecord]) -> Result<Vec<(f64, f64)>> {
    let mut levels: Vec<(f64, Vec<f64>)> = Vec::new();

    for trial in trials {
        if trial.chose_right().is_none() {
            continue;
        }
        let contrast = trial.signed_contrast();
        let entry = levels
            .iter_mut()
            .find(|(c, _)| (*c - contrast).abs() < f64::EPSILON);
        match entry {
            Some((_, rts)) => rts.push(trial.response_time()),
            None => levels.push((contrast, vec![trial.response_time()])),
        }
    }

    if levels.is_empty() {
        return Err(Error::InsufficientData {
            context: "chronometric summary".to_string(),
            needed: 1,
            got: 0,
        });
    }

    levels.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(levels
        .into_iter()
        .map(|(contrast, rts)| (contrast, stats::median(&rts)))
        .collect())
}

/// Number of distinct signed-contrast levels among responded trials.
#[must_use]
pub fn distinct_contrast_levels(trials: &[TrialRecord]) -> usize {
    summarize_by_contrast(trials).map_or(0, |s| s.len())
}

/// Compute the scalar summary of one session's trials.
///
/// # Errors
/// Returns `InsufficientData` on an empty trial list.
pub fn session_summary(trials: &[TrialRecord]) -> Result<SessionSummary> {
    if trials.is_empty() {
        return Err(Error::InsufficientData {
            context: "session summary".to_string(),
            needed: 1,
            got: 0,
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let n_trials = trials.len();
    let n_correct = trials.iter().filter(|t| t.correct()).count();

    let easy: Vec<&TrialRecord> = trials
        .iter()
        .filter(|t| t.signed_contrast().abs() >= EASY_CONTRAST_THRESHOLD)
        .collect();
    let n_easy_correct = easy.iter().filter(|t| t.correct()).count();

    let reaction_times: Vec<f64> = trials
        .iter()
        .filter(|t| t.chose_right().is_some())
        .map(TrialRecord::response_time)
        .collect();

    let responded: Vec<bool> = trials.iter().filter_map(TrialRecord::chose_right).collect();
    let n_right = responded.iter().filter(|&&r| r).count();

    #[allow(clippy::cast_precision_loss)]
    Ok(SessionSummary {
        n_trials,
        performance: n_correct as f64 / n_trials as f64,
        performance_easy: if easy.is_empty() {
            f64::NAN
        } else {
            n_easy_correct as f64 / easy.len() as f64
        },
        median_reaction_time: if reaction_times.is_empty() {
            f64::NAN
        } else {
            stats::median(&reaction_times)
        },
        rightward_bias: if responded.is_empty() {
            f64::NAN
        } else {
            n_right as f64 / responded.len() as f64
        },
    })
}
