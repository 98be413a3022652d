//! Trial Record - one trial of the two-alternative contrast task

use serde::{Deserialize, Serialize};

/// Response choice on a trial.
///
/// In the rig convention a clockwise wheel turn (`CW`) brings a rightward
/// stimulus to center and is recorded as a rightward choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Choice {
    /// Counter-clockwise wheel turn (leftward stimulus chosen)
    Left,
    /// Clockwise wheel turn (rightward stimulus chosen)
    Right,
    /// No response within the response window
    NoGo,
}

/// Feedback delivered at the end of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feedback {
    /// Reward delivered
    Correct,
    /// Noise burst / timeout
    Error,
    /// No feedback (e.g. no-go trials)
    NoFeedback,
}

/// Trial Record represents a single trial within a session.
///
/// Contrasts are stored as fractions in `[0, 1]`; at most one side is
/// nonzero in the standard task but both fields are kept, matching the
/// source schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialRecord {
    session_id: String,
    trial_id: u64,
    contrast_left: f64,
    contrast_right: f64,
    choice: Choice,
    feedback: Feedback,
    response_time: f64,
}

impl TrialRecord {
    /// Create a new trial record.
    ///
    /// # Arguments
    ///
    /// * `session_id` - ID of the parent session
    /// * `trial_id` - Trial index within the session
    /// * `contrast_left` / `contrast_right` - Stimulus contrasts in `[0, 1]`
    /// * `choice` - Response choice
    /// * `feedback` - Feedback type
    /// * `response_time` - Reaction time in seconds
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        trial_id: u64,
        contrast_left: f64,
        contrast_right: f64,
        choice: Choice,
        feedback: Feedback,
        response_time: f64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            trial_id,
            contrast_left,
            contrast_right,
            choice,
            feedback,
            response_time,
        }
    }

    /// Get the parent session ID.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get the trial index within the session.
    #[must_use]
    pub const fn trial_id(&self) -> u64 {
        self.trial_id
    }

    /// Get the left stimulus contrast in `[0, 1]`.
    #[must_use]
    pub const fn contrast_left(&self) -> f64 {
        self.contrast_left
    }

    /// Get the right stimulus contrast in `[0, 1]`.
    #[must_use]
    pub const fn contrast_right(&self) -> f64 {
        self.contrast_right
    }

    /// Get the response choice.
    #[must_use]
    pub const fn choice(&self) -> Choice {
        self.choice
    }

    /// Get the feedback type.
    #[must_use]
    pub const fn feedback(&self) -> Feedback {
        self.feedback
    }

    /// Get the reaction time in seconds.
    #[must_use]
    pub const fn response_time(&self) -> f64 {
        self.response_time
    }

    /// Signed contrast in percent: positive for rightward stimuli.
    #[must_use]
    pub fn signed_contrast(&self) -> f64 {
        100.0 * (self.contrast_right - self.contrast_left)
    }

    /// Whether the subject chose rightward on this trial.
    ///
    /// Returns `None` for no-go trials, which are excluded from choice
    /// fractions.
    #[must_use]
    pub const fn chose_right(&self) -> Option<bool> {
        match self.choice {
            Choice::Right => Some(true),
            Choice::Left => Some(false),
            Choice::NoGo => None,
        }
    }

    /// Whether feedback was positive on this trial.
    #[must_use]
    pub const fn correct(&self) -> bool {
        matches!(self.feedback, Feedback::Correct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_contrast_sign_convention() {
        let right = TrialRecord::new("s", 0, 0.0, 0.5, Choice::Right, Feedback::Correct, 0.3);
        let left = TrialRecord::new("s", 1, 1.0, 0.0, Choice::Left, Feedback::Correct, 0.3);
        assert!((right.signed_contrast() - 50.0).abs() < f64::EPSILON);
        assert!((left.signed_contrast() + 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_chose_right_excludes_nogo() {
        let nogo = TrialRecord::new("s", 0, 0.0, 0.0, Choice::NoGo, Feedback::NoFeedback, 60.0);
        assert_eq!(nogo.chose_right(), None);
    }
}
