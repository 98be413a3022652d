//! Subject Record - root entity of the cohort

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Subject Record represents one experimental animal.
///
/// This is the root entity in the cohort schema. Each subject can have
/// multiple sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectRecord {
    subject_id: String,
    nickname: String,
    lab: String,
    birth_date: Option<NaiveDate>,
    death_date: Option<NaiveDate>,
    line: Option<String>,
}

impl SubjectRecord {
    /// Create a new subject record with the given ID, nickname, and lab.
    #[must_use]
    pub fn new(
        subject_id: impl Into<String>,
        nickname: impl Into<String>,
        lab: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            nickname: nickname.into(),
            lab: lab.into(),
            birth_date: None,
            death_date: None,
            line: None,
        }
    }

    /// Create a builder for constructing a subject record with optional fields.
    #[must_use]
    pub fn builder(
        subject_id: impl Into<String>,
        nickname: impl Into<String>,
        lab: impl Into<String>,
    ) -> SubjectRecordBuilder {
        SubjectRecordBuilder::new(subject_id, nickname, lab)
    }

    /// Get the subject ID.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Get the human-readable nickname.
    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Get the lab the subject belongs to.
    #[must_use]
    pub fn lab(&self) -> &str {
        &self.lab
    }

    /// Get the birth date, if recorded.
    #[must_use]
    pub const fn birth_date(&self) -> Option<NaiveDate> {
        self.birth_date
    }

    /// Get the death date, if recorded.
    ///
    /// The weight model is only run for deceased subjects, for which no
    /// further data is expected.
    #[must_use]
    pub const fn death_date(&self) -> Option<NaiveDate> {
        self.death_date
    }

    /// Get the genetic line, if recorded.
    #[must_use]
    pub fn line(&self) -> Option<&str> {
        self.line.as_deref()
    }
}

/// Builder for `SubjectRecord`.
#[derive(Debug)]
pub struct SubjectRecordBuilder {
    subject_id: String,
    nickname: String,
    lab: String,
    birth_date: Option<NaiveDate>,
    death_date: Option<NaiveDate>,
    line: Option<String>,
}

impl SubjectRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(
        subject_id: impl Into<String>,
        nickname: impl Into<String>,
        lab: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            nickname: nickname.into(),
            lab: lab.into(),
            birth_date: None,
            death_date: None,
            line: None,
        }
    }

    /// Set the birth date.
    #[must_use]
    pub const fn birth_date(mut self, date: NaiveDate) -> Self {
        self.birth_date = Some(date);
        self
    }

    /// Set the death date.
    #[must_use]
    pub const fn death_date(mut self, date: NaiveDate) -> Self {
        self.death_date = Some(date);
        self
    }

    /// Set the genetic line.
    #[must_use]
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.line = Some(line.into());
        self
    }

    /// Build the `SubjectRecord`.
    #[must_use]
    pub fn build(self) -> SubjectRecord {
        SubjectRecord {
            subject_id: self.subject_id,
            nickname: self.nickname,
            lab: self.lab,
            birth_date: self.birth_date,
            death_date: self.death_date,
            line: self.line,
        }
    }
}
