//! Session Record - one behavioral session of a subject

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session Record represents a single behavioral session.
///
/// Each subject can have multiple sessions; trials reference their session
/// by ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    session_id: String,
    subject_id: String,
    start_time: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a new session record starting now.
    #[must_use]
    pub fn new(session_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            subject_id: subject_id.into(),
            start_time: Utc::now(),
        }
    }

    /// Create a builder for constructing a session record with an explicit
    /// start time.
    #[must_use]
    pub fn builder(
        session_id: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> SessionRecordBuilder {
        SessionRecordBuilder::new(session_id, subject_id)
    }

    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get the parent subject ID.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Get the session start time.
    #[must_use]
    pub const fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }
}

/// Builder for `SessionRecord`.
#[derive(Debug)]
pub struct SessionRecordBuilder {
    session_id: String,
    subject_id: String,
    start_time: DateTime<Utc>,
}

impl SessionRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(session_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            subject_id: subject_id.into(),
            start_time: Utc::now(),
        }
    }

    /// Set an explicit start time (useful for deserialization/testing).
    #[must_use]
    pub const fn start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    /// Build the `SessionRecord`.
    #[must_use]
    pub fn build(self) -> SessionRecord {
        SessionRecord {
            session_id: self.session_id,
            subject_id: self.subject_id,
            start_time: self.start_time,
        }
    }
}
