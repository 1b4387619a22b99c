//! Job store
//!
//! Concurrent id -> record map shared by submitters, status readers and
//! workers. Every mutation goes through a single `DashMap` entry, so a
//! reader never observes a half-updated record.

use crate::error::OperationError;
use crate::types::{JobId, JobLookup, JobRecord, JobStatus};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

/// Job counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

impl QueueStats {
    /// Total jobs ever submitted
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.queued + self.running + self.done + self.failed
    }
}

/// Records of every submitted job, kept for the life of the process
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: DashMap<JobId, JobRecord>,
}

impl JobStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `queued` record under a fresh id
    pub fn insert_queued(&self, name: impl Into<String>, args: Value) -> JobId {
        let mut record = JobRecord::queued(JobId::new(), name, args);
        loop {
            match self.jobs.entry(record.id) {
                Entry::Vacant(slot) => {
                    let id = record.id;
                    slot.insert(record);
                    return id;
                }
                Entry::Occupied(_) => record.id = JobId::new(),
            }
        }
    }

    /// Snapshot of a job
    #[must_use]
    pub fn lookup(&self, id: &JobId) -> JobLookup {
        self.jobs
            .get(id)
            .map_or(JobLookup::Unknown, |record| JobLookup::Known(record.clone()))
    }

    /// Move a queued job to `running`, returning what to execute
    pub(crate) fn mark_running(&self, id: &JobId) -> Option<(String, Value)> {
        let mut record = self.jobs.get_mut(id)?;
        if record.status != JobStatus::Queued {
            return None;
        }
        record.status = JobStatus::Running;
        record.started_at = Some(Utc::now());
        Some((record.name.clone(), record.args.clone()))
    }

    /// Record the terminal outcome of a running job
    pub(crate) fn finish(&self, id: &JobId, outcome: Result<Value, OperationError>) {
        let Some(mut record) = self.jobs.get_mut(id) else {
            return;
        };
        match outcome {
            Ok(result) => {
                record.status = JobStatus::Done;
                record.result = Some(result);
            }
            Err(e) => {
                record.status = JobStatus::Failed;
                record.error = Some(e.to_string());
            }
        }
        record.finished_at = Some(Utc::now());
    }

    /// Counts by status
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for entry in &self.jobs {
            match entry.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Done => stats.done += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Number of jobs ever submitted
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether nothing was submitted yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
