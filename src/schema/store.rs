//! Cohort Store - in-memory storage for cohort records
//!
//! Read-mostly: records are bulk-loaded up front, then queried by the
//! analysis modules. The only write-back path is `insert_weights`.

use rustc_hash::{FxHashMap, FxHashSet};

use super::{SessionRecord, SubjectRecord, TrialRecord, WeightRecord};
use crate::{Error, Result};

/// In-memory store for cohort records.
///
/// ## Design
///
/// Hash maps give O(1) lookups by ID; trials and weights live in vectors
/// that are filtered and sorted for the ordered queries the analysis
/// modules need (trials by index, sessions by start time).
#[derive(Debug, Default)]
pub struct CohortStore {
    subjects: FxHashMap<String, SubjectRecord>,
    sessions: FxHashMap<String, SessionRecord>,
    trials: Vec<TrialRecord>,
    weights: Vec<WeightRecord>,
    weight_keys: FxHashSet<(String, String, u64)>,
}

impl CohortStore {
    /// Create a new empty cohort store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the store holds no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
            && self.sessions.is_empty()
            && self.trials.is_empty()
            && self.weights.is_empty()
    }

    /// Get the number of subjects in the store.
    #[must_use]
    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    /// Get the number of sessions in the store.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Get the number of trials in the store.
    #[must_use]
    pub fn trial_count(&self) -> usize {
        self.trials.len()
    }

    /// Get the number of fitted weight rows in the store.
    #[must_use]
    pub fn weight_count(&self) -> usize {
        self.weights.len()
    }

    /// Add a subject to the store.
    pub fn add_subject(&mut self, subject: SubjectRecord) {
        self.subjects
            .insert(subject.subject_id().to_string(), subject);
    }

    /// Get a subject by ID.
    #[must_use]
    pub fn get_subject(&self, subject_id: &str) -> Option<&SubjectRecord> {
        self.subjects.get(subject_id)
    }

    /// Iterate over all subjects in the store (unordered).
    pub fn subjects(&self) -> impl Iterator<Item = &SubjectRecord> {
        self.subjects.values()
    }

    /// Add a session to the store.
    pub fn add_session(&mut self, session: SessionRecord) {
        self.sessions
            .insert(session.session_id().to_string(), session);
    }

    /// Get a session by ID.
    #[must_use]
    pub fn get_session(&self, session_id: &str) -> Option<&SessionRecord> {
        self.sessions.get(session_id)
    }

    /// Add a trial to the store.
    pub fn add_trial(&mut self, trial: TrialRecord) {
        self.trials.push(trial);
    }

    /// Get all sessions for a subject, ordered by start time.
    #[must_use]
    pub fn sessions_for_subject(&self, subject_id: &str) -> Vec<&SessionRecord> {
        let mut sessions: Vec<&SessionRecord> = self
            .sessions
            .values()
            .filter(|s| s.subject_id() == subject_id)
            .collect();
        sessions.sort_by_key(|s| s.start_time());
        sessions
    }

    /// Get all trials for a session, ordered by trial index.
    #[must_use]
    pub fn trials_for_session(&self, session_id: &str) -> Vec<&TrialRecord> {
        let mut trials: Vec<&TrialRecord> = self
            .trials
            .iter()
            .filter(|t| t.session_id() == session_id)
            .collect();
        trials.sort_by_key(|t| t.trial_id());
        trials
    }

    /// Get all trials for a subject in session-start then trial-index order.
    ///
    /// This is the trial sequence the time-varying weight model consumes:
    /// sessions chronologically, trials within each session in order.
    #[must_use]
    pub fn trials_for_subject(&self, subject_id: &str) -> Vec<&TrialRecord> {
        let mut trials = Vec::new();
        for session in self.sessions_for_subject(subject_id) {
            trials.extend(self.trials_for_session(session.session_id()));
        }
        trials
    }

    /// Insert fitted weight rows, one per trial.
    ///
    /// This is the single write-back path for model output. Rows are
    /// validated against the already-inserted keys and against each other;
    /// a duplicate (subject, session, trial) key anywhere rejects the whole
    /// batch and leaves the store unchanged.
    ///
    /// # Errors
    /// Returns `DuplicateWeight` naming the first offending key.
    pub fn insert_weights(&mut self, records: Vec<WeightRecord>) -> Result<()> {
        let mut batch_keys = FxHashSet::default();
        for record in &records {
            let key = (
                record.subject_id().to_string(),
                record.session_id().to_string(),
                record.trial_id(),
            );
            if self.weight_keys.contains(&key) || batch_keys.contains(&key) {
                return Err(Error::DuplicateWeight {
                    subject_id: key.0,
                    session_id: key.1,
                    trial_id: key.2,
                });
            }
            batch_keys.insert(key);
        }
        self.weight_keys.extend(batch_keys);
        self.weights.extend(records);
        Ok(())
    }

    /// Get all fitted weight rows for a subject in session-then-trial order.
    #[must_use]
    pub fn weights_for_subject(&self, subject_id: &str) -> Vec<&WeightRecord> {
        let mut rows: Vec<&WeightRecord> = self
            .weights
            .iter()
            .filter(|w| w.subject_id() == subject_id)
            .collect();
        rows.sort_by(|a, b| {
            let sa = self.sessions.get(a.session_id()).map(SessionRecord::start_time);
            let sb = self.sessions.get(b.session_id()).map(SessionRecord::start_time);
            sa.cmp(&sb).then(a.trial_id().cmp(&b.trial_id()))
        });
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Choice, Feedback};
    use chrono::{TimeZone, Utc};

    fn seeded_store() -> CohortStore {
        let mut store = CohortStore::new();
        store.add_subject(SubjectRecord::new("s-1", "CSHL_003", "churchlandlab"));
        for (i, day) in [3, 1, 2].iter().enumerate() {
            let t = Utc.with_ymd_and_hms(2019, 9, *day, 12, 0, 0).unwrap();
            store.add_session(
                SessionRecord::builder(format!("sess-{i}"), "s-1")
                    .start_time(t)
                    .build(),
            );
        }
        store
    }

    #[test]
    fn test_sessions_ordered_by_start_time() {
        let store = seeded_store();
        let sessions = store.sessions_for_subject("s-1");
        assert_eq!(sessions.len(), 3);
        // sess-1 (day 1), sess-2 (day 2), sess-0 (day 3)
        assert_eq!(sessions[0].session_id(), "sess-1");
        assert_eq!(sessions[2].session_id(), "sess-0");
    }

    #[test]
    fn test_trials_ordered_by_index() {
        let mut store = seeded_store();
        for id in [2u64, 0, 1] {
            store.add_trial(TrialRecord::new(
                "sess-1",
                id,
                0.0,
                0.25,
                Choice::Right,
                Feedback::Correct,
                0.4,
            ));
        }
        let trials = store.trials_for_session("sess-1");
        assert_eq!(trials[0].trial_id(), 0);
        assert_eq!(trials[2].trial_id(), 2);
    }

    #[test]
    fn test_insert_weights_rejects_duplicates() {
        let mut store = seeded_store();
        let row = WeightRecord::new("s-1", "sess-1", 0, 0.1, 2.0, 2.1);
        store.insert_weights(vec![row.clone()]).unwrap();

        let err = store.insert_weights(vec![row]).unwrap_err();
        assert!(err.to_string().contains("Duplicate weight record"));
        // rejected batch leaves the store unchanged
        assert_eq!(store.weight_count(), 1);
    }

    #[test]
    fn test_insert_weights_rejects_duplicates_within_batch() {
        let mut store = seeded_store();
        let row = WeightRecord::new("s-1", "sess-1", 0, 0.1, 2.0, 2.1);

        let err = store
            .insert_weights(vec![row.clone(), row])
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate weight record"));
        // nothing from the rejected batch lands
        assert_eq!(store.weight_count(), 0);
    }

    #[test]
    fn test_weights_for_subject_ordering() {
        let mut store = seeded_store();
        store
            .insert_weights(vec![
                WeightRecord::new("s-1", "sess-0", 0, 0.0, 1.0, 1.0),
                WeightRecord::new("s-1", "sess-1", 1, 0.1, 1.1, 1.1),
                WeightRecord::new("s-1", "sess-1", 0, 0.2, 1.2, 1.2),
            ])
            .unwrap();
        let rows = store.weights_for_subject("s-1");
        // sess-1 starts first
        assert_eq!(rows[0].session_id(), "sess-1");
        assert_eq!(rows[0].trial_id(), 0);
        assert_eq!(rows[2].session_id(), "sess-0");
    }
}
