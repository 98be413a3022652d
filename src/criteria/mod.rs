//! Training-criterion classification
//!
//! Classifies each subject's training history as trained, in-training, or
//! untrainable. Two interchangeable criteria are provided behind the
//! [`TrainingCriterion`] trait so cohorts can be tabulated under both and
//! the resulting status breakdowns compared side by side.
//!
//! A criterion scans the subject's sessions chronologically and declares
//! the subject trained at the first three-session window whose per-session
//! summaries and pooled psychometric fit clear the thresholds. A subject
//! that never clears them is untrainable once its session count exceeds
//! the training horizon, and in-training before that.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::behavior::{self, SessionSummary};
use crate::psychometric::{FitBounds, FitCache, PsychoFit};
use crate::schema::{CohortStore, TrainingStatus, TrialRecord};
use crate::{Error, Result};

/// Sessions after which an untrained subject is declared untrainable.
pub const TRAINING_HORIZON_SESSIONS: usize = 40;

/// Width of the sliding window of sessions a criterion evaluates.
pub const CRITERION_WINDOW: usize = 3;

/// One subject's training history in chronological order.
///
/// Each entry pairs the session's scalar summary with its trials, so
/// criteria can pool windows of raw trials for the psychometric fit.
#[derive(Debug, Clone)]
pub struct SubjectHistory {
    subject_id: String,
    session_ids: Vec<String>,
    summaries: Vec<SessionSummary>,
    trials: Vec<Vec<TrialRecord>>,
}

impl SubjectHistory {
    /// Assemble the history for one subject from the store.
    ///
    /// Sessions with no trials are skipped; they carry no evidence either
    /// way.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the subject is unknown.
    pub fn from_store(store: &CohortStore, subject_id: &str) -> Result<Self> {
        if store.get_subject(subject_id).is_none() {
            return Err(Error::InvalidInput(format!(
                "Unknown subject: {subject_id}"
            )));
        }

        let mut session_ids = Vec::new();
        let mut summaries = Vec::new();
        let mut trials = Vec::new();
        for session in store.sessions_for_subject(subject_id) {
            let session_trials: Vec<TrialRecord> = store
                .trials_for_session(session.session_id())
                .into_iter()
                .cloned()
                .collect();
            if session_trials.is_empty() {
                continue;
            }
            summaries.push(behavior::session_summary(&session_trials)?);
            session_ids.push(session.session_id().to_string());
            trials.push(session_trials);
        }

        Ok(Self {
            subject_id: subject_id.to_string(),
            session_ids,
            summaries,
            trials,
        })
    }

    /// Subject this history belongs to.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Number of non-empty sessions in the history.
    #[must_use]
    pub fn n_sessions(&self) -> usize {
        self.summaries.len()
    }

    /// Per-session summaries in chronological order.
    #[must_use]
    pub fn summaries(&self) -> &[SessionSummary] {
        &self.summaries
    }

    /// Pool the trials of sessions `window` (by index) into one vector.
    fn pooled_trials(&self, window: std::ops::RangeInclusive<usize>) -> Vec<TrialRecord> {
        self.trials[window].iter().flatten().cloned().collect()
    }

    /// Cache key for the pooled fit of a session window.
    fn window_key(&self, last: usize) -> String {
        format!(
            "{}:{}..{}",
            self.subject_id,
            self.session_ids[last + 1 - CRITERION_WINDOW],
            self.session_ids[last]
        )
    }
}

/// Thresholds a three-session window must clear.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CriterionThresholds {
    /// Minimum trial count in each session of the window
    pub min_trials: usize,
    /// Minimum fraction correct at easy contrasts in each session
    pub min_performance_easy: f64,
    /// Maximum absolute bias of the pooled fit, percent contrast
    pub max_abs_bias: f64,
    /// Maximum threshold of the pooled fit, percent contrast
    pub max_threshold: f64,
    /// Maximum lapse rate (either side) of the pooled fit
    pub max_lapse: f64,
}

/// Classifier over one subject's training history.
pub trait TrainingCriterion {
    /// Short name used in tabulations and figures.
    fn name(&self) -> &str;

    /// Classify a subject's history.
    ///
    /// Pooled psychometric fits are looked up in `cache` so tabulating a
    /// cohort under several criteria fits each window once.
    ///
    /// # Errors
    /// Propagates psychometric fit failures other than insufficient
    /// contrast coverage (which merely fails the window).
    fn classify(&self, history: &SubjectHistory, cache: &FitCache) -> Result<TrainingStatus>;
}

/// Shared window scan used by both bundled criteria.
fn classify_with(
    history: &SubjectHistory,
    cache: &FitCache,
    thresholds: &CriterionThresholds,
) -> Result<TrainingStatus> {
    let n = history.n_sessions();

    for last in (CRITERION_WINDOW - 1)..n {
        let window = (last + 1 - CRITERION_WINDOW)..=last;
        let summaries = &history.summaries[window.clone()];

        let sessions_pass = summaries.iter().all(|s| {
            s.n_trials >= thresholds.min_trials
                && s.performance_easy >= thresholds.min_performance_easy
        });
        if !sessions_pass {
            continue;
        }

        let pooled = history.pooled_trials(window);
        let Some(fit) = pooled_fit(history, last, &pooled, cache)? else {
            continue;
        };

        let params = fit.params;
        if params.bias.abs() < thresholds.max_abs_bias
            && params.threshold < thresholds.max_threshold
            && params.lapse_low < thresholds.max_lapse
            && params.lapse_high < thresholds.max_lapse
        {
            debug!(
                subject = history.subject_id(),
                session = last,
                "training criterion met"
            );
            return Ok(TrainingStatus::Trained);
        }
    }

    if n > TRAINING_HORIZON_SESSIONS {
        Ok(TrainingStatus::Untrainable)
    } else {
        Ok(TrainingStatus::InTraining)
    }
}

/// Fit the pooled window, treating insufficient contrast coverage as a
/// failed window rather than an error.
fn pooled_fit(
    history: &SubjectHistory,
    last: usize,
    pooled: &[TrialRecord],
    cache: &FitCache,
) -> Result<Option<PsychoFit>> {
    let data = match behavior::summarize_by_contrast(pooled) {
        Ok(data) => data,
        Err(Error::InsufficientData { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    let bounds = FitBounds::from_data(&data)?;
    match cache.get_or_fit(&history.window_key(last), &data, &bounds) {
        Ok(fit) => Ok(Some(fit)),
        Err(Error::InsufficientData { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// The paper's training criterion.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineCriterion;

impl BaselineCriterion {
    /// Thresholds of the baseline criterion.
    #[must_use]
    pub const fn thresholds() -> CriterionThresholds {
        CriterionThresholds {
            min_trials: 200,
            min_performance_easy: 0.8,
            max_abs_bias: 16.0,
            max_threshold: 19.0,
            max_lapse: 0.2,
        }
    }
}

impl TrainingCriterion for BaselineCriterion {
    fn name(&self) -> &str {
        "baseline"
    }

    fn classify(&self, history: &SubjectHistory, cache: &FitCache) -> Result<TrainingStatus> {
        classify_with(history, cache, &Self::thresholds())
    }
}

/// A stricter variant of the criterion: more trials, higher easy-contrast
/// performance, and a tighter pooled fit.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictCriterion;

impl StrictCriterion {
    /// Thresholds of the strict criterion.
    #[must_use]
    pub const fn thresholds() -> CriterionThresholds {
        CriterionThresholds {
            min_trials: 400,
            min_performance_easy: 0.9,
            max_abs_bias: 10.0,
            max_threshold: 19.0,
            max_lapse: 0.1,
        }
    }
}

impl TrainingCriterion for StrictCriterion {
    fn name(&self) -> &str {
        "strict"
    }

    fn classify(&self, history: &SubjectHistory, cache: &FitCache) -> Result<TrainingStatus> {
        classify_with(history, cache, &Self::thresholds())
    }
}

/// Per-criterion status counts over a cohort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusTabulation {
    criteria: Vec<String>,
    /// Per criterion: counts for [`InTraining`, `Trained`, `Untrainable`]
    /// in that order
    counts: Vec<[usize; 3]>,
}

impl StatusTabulation {
    /// Classify every subject in the store under both criteria.
    ///
    /// Both criteria see every subject exactly once, so the per-criterion
    /// totals always agree.
    ///
    /// # Errors
    /// Propagates history assembly and fit errors.
    pub fn compare(
        store: &CohortStore,
        first: &dyn TrainingCriterion,
        second: &dyn TrainingCriterion,
    ) -> Result<Self> {
        let cache = FitCache::new();
        let mut counts = vec![[0usize; 3]; 2];

        for subject in store.subjects() {
            let history = SubjectHistory::from_store(store, subject.subject_id())?;
            for (idx, criterion) in [first, second].into_iter().enumerate() {
                let status = criterion.classify(&history, &cache)?;
                counts[idx][status_index(status)] += 1;
            }
        }

        Ok(Self {
            criteria: vec![first.name().to_string(), second.name().to_string()],
            counts,
        })
    }

    /// Names of the compared criteria, in order.
    #[must_use]
    pub fn criteria(&self) -> &[String] {
        &self.criteria
    }

    /// Count of subjects with `status` under criterion `criterion_idx`.
    #[must_use]
    pub fn count(&self, criterion_idx: usize, status: TrainingStatus) -> usize {
        self.counts[criterion_idx][status_index(status)]
    }

    /// Total subjects classified under criterion `criterion_idx`.
    #[must_use]
    pub fn total(&self, criterion_idx: usize) -> usize {
        self.counts[criterion_idx].iter().sum()
    }

    /// Status fractions under criterion `criterion_idx`, in
    /// [`InTraining`, `Trained`, `Untrainable`] order. All zeros for an
    /// empty cohort.
    #[must_use]
    pub fn fractions(&self, criterion_idx: usize) -> [f64; 3] {
        let total = self.total(criterion_idx);
        if total == 0 {
            return [0.0; 3];
        }
        #[allow(clippy::cast_precision_loss)]
        let total = total as f64;
        #[allow(clippy::cast_precision_loss)]
        self.counts[criterion_idx].map(|c| c as f64 / total)
    }
}

const fn status_index(status: TrainingStatus) -> usize {
    match status {
        TrainingStatus::InTraining => 0,
        TrainingStatus::Trained => 1,
        TrainingStatus::Untrainable => 2,
    }
}
