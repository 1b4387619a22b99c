//! Core types for the task queue
//!
//! Defines job identity and the job record state machine:
//! `queued -> running -> done | failed`.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

/// Unique job identifier (UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate new job ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    /// `done` or `failed`
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Mutable state of one submitted job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    /// Operation name as submitted
    pub name: String,
    /// Argument payload as submitted (`{}` when none was given)
    pub args: Value,
    pub status: JobStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Fresh `queued` record
    #[must_use]
    pub fn queued(id: JobId, name: impl Into<String>, args: Value) -> Self {
        Self {
            id,
            name: name.into(),
            args,
            status: JobStatus::Queued,
            result: None,
            error: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Result of a status lookup
///
/// Serializes as the job record, or as `{"status": "unknown"}` for an
/// identifier that was never submitted.
#[derive(Debug, Clone, PartialEq)]
pub enum JobLookup {
    Known(JobRecord),
    Unknown,
}

impl JobLookup {
    /// The record, if the job is known
    #[must_use]
    pub fn record(&self) -> Option<&JobRecord> {
        match self {
            Self::Known(record) => Some(record),
            Self::Unknown => None,
        }
    }

    /// Status string as reported to callers
    #[must_use]
    pub fn status_str(&self) -> &'static str {
        match self {
            Self::Known(record) => match record.status {
                JobStatus::Queued => "queued",
                JobStatus::Running => "running",
                JobStatus::Done => "done",
                JobStatus::Failed => "failed",
            },
            Self::Unknown => "unknown",
        }
    }
}

impl Serialize for JobLookup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(record) => record.serialize(serializer),
            Self::Unknown => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("status", "unknown")?;
                map.end()
            }
        }
    }
}
