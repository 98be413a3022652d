//! Record schema for the experiment cohort
//!
//! The relational shape mirrors the source database:
//!
//! ```text
//! SubjectRecord (1) ──< SessionRecord (N) ──< TrialRecord (N)
//!                                                  │
//!                                                  └── WeightRecord (0..1 per trial)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use ethogram::schema::{CohortStore, SessionRecord, SubjectRecord, TrialRecord, Choice, Feedback};
//!
//! let mut store = CohortStore::new();
//! store.add_subject(SubjectRecord::new("mouse-01", "CSHL_003", "churchlandlab"));
//! store.add_session(SessionRecord::new("sess-01", "mouse-01"));
//! store.add_trial(
//!     TrialRecord::new("sess-01", 0, 0.0, 0.5, Choice::Right, Feedback::Correct, 0.41),
//! );
//! assert_eq!(store.trials_for_session("sess-01").len(), 1);
//! ```

mod session;
mod store;
mod subject;
mod trial;
mod weight_record;

pub use session::{SessionRecord, SessionRecordBuilder};
pub use store::CohortStore;
pub use subject::{SubjectRecord, SubjectRecordBuilder};
pub use trial::{Choice, Feedback, TrialRecord};
pub use weight_record::WeightRecord;

use serde::{Deserialize, Serialize};

/// Per-session training status label.
///
/// Derived per session by a [`crate::criteria::TrainingCriterion`]; the
/// source database also carried an `over40days` label which is normalized
/// to `Untrainable` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrainingStatus {
    /// Subject has not yet met the trained criterion
    InTraining,
    /// Subject met the trained criterion
    Trained,
    /// Subject exceeded the session budget without meeting criterion
    Untrainable,
}

impl TrainingStatus {
    /// Parse a status label as stored in the source database.
    ///
    /// Accepts the legacy `over40days` spelling as `Untrainable`.
    ///
    /// # Errors
    /// Returns `InvalidInput` for unknown labels.
    pub fn parse(label: &str) -> crate::Result<Self> {
        match label {
            "in_training" | "training in progress" => Ok(Self::InTraining),
            "trained" => Ok(Self::Trained),
            "untrainable" | "over40days" => Ok(Self::Untrainable),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown training status: {other}"
            ))),
        }
    }

    /// Canonical label for figures and serialization.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::InTraining => "in training",
            Self::Trained => "trained",
            Self::Untrainable => "untrainable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_normalizes_over40days() {
        assert_eq!(
            TrainingStatus::parse("over40days").unwrap(),
            TrainingStatus::Untrainable
        );
        assert_eq!(
            TrainingStatus::parse("trained").unwrap(),
            TrainingStatus::Trained
        );
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert!(TrainingStatus::parse("wrong session type run").is_err());
    }
}
