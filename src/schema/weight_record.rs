//! Weight Record - per-trial fitted weights from the time-varying model

use serde::{Deserialize, Serialize};

/// One row of the fitted-weight table: the three model weights evaluated at
/// a single trial, keyed by subject, session, and trial index.
///
/// Produced by [`crate::weights::WeightFit::into_records`] and persisted via
/// [`crate::schema::CohortStore::insert_weights`], the single write-back
/// path in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightRecord {
    subject_id: String,
    session_id: String,
    trial_id: u64,
    weight_bias: f64,
    weight_contrast_left: f64,
    weight_contrast_right: f64,
}

impl WeightRecord {
    /// Create a new weight record.
    #[must_use]
    pub fn new(
        subject_id: impl Into<String>,
        session_id: impl Into<String>,
        trial_id: u64,
        weight_bias: f64,
        weight_contrast_left: f64,
        weight_contrast_right: f64,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            session_id: session_id.into(),
            trial_id,
            weight_bias,
            weight_contrast_left,
            weight_contrast_right,
        }
    }

    /// Get the subject ID.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get the trial index within the session.
    #[must_use]
    pub const fn trial_id(&self) -> u64 {
        self.trial_id
    }

    /// Get the fitted bias weight at this trial.
    #[must_use]
    pub const fn weight_bias(&self) -> f64 {
        self.weight_bias
    }

    /// Get the fitted contrast-left weight at this trial.
    #[must_use]
    pub const fn weight_contrast_left(&self) -> f64 {
        self.weight_contrast_left
    }

    /// Get the fitted contrast-right weight at this trial.
    #[must_use]
    pub const fn weight_contrast_right(&self) -> f64 {
        self.weight_contrast_right
    }
}
