//! Import job state machine.
//!
//! One job per (source, run). Created Pending, driven through Fetching
//! and Loading by the orchestrator that owns it, and immutable once
//! terminal. Parsing and loading are a single pipelined stage, so they
//! share the Loading status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RejectReason, RejectedRow};
use crate::records::GazetteerSource;

/// Cap on stored per-record errors; counts keep incrementing past it.
const MAX_LOGGED_ERRORS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Fetching,
    Loading,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A logged per-record problem: (external id if known, reason, detail).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub external_id: Option<String>,
    pub reason: RejectReason,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub source: GazetteerSource,
    pub status: JobStatus,
    pub records_seen: u64,
    pub records_loaded: u64,
    pub records_rejected: u64,
    pub errors: Vec<JobError>,
    /// Set when the run failed for a structural reason.
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn new(source: GazetteerSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            status: JobStatus::Pending,
            records_seen: 0,
            records_loaded: 0,
            records_rejected: 0,
            errors: Vec::new(),
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Advance to a non-terminal stage. Ignored once terminal.
    pub fn transition(&mut self, next: JobStatus) {
        if self.status.is_terminal() {
            tracing::warn!(job_id = %self.id, ?next, "ignoring transition on terminal job");
            return;
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn record_rejection(&mut self, rejected: RejectedRow) {
        self.records_rejected += 1;
        if self.errors.len() < MAX_LOGGED_ERRORS {
            self.errors.push(JobError {
                external_id: rejected.external_id,
                reason: rejected.reason,
                detail: rejected.detail,
            });
        }
    }

    pub fn complete(&mut self) {
        self.transition(JobStatus::Completed);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.failure = Some(reason.into());
        self.transition(JobStatus::Failed);
    }

    /// "Completed with N rejected records" vs "failed": callers
    /// distinguish via status, not counts.
    pub fn summary(&self) -> String {
        format!(
            "{} import {}: {} seen, {} loaded, {} rejected",
            self.source,
            match self.status {
                JobStatus::Completed => "completed",
                JobStatus::Failed => "failed",
                _ => "in progress",
            },
            self.records_seen,
            self.records_loaded,
            self.records_rejected,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectedRow;

    #[test]
    fn test_terminal_is_immutable() {
        let mut job = ImportJob::new(GazetteerSource::Geonames);
        job.transition(JobStatus::Fetching);
        job.transition(JobStatus::Loading);
        job.complete();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.finished_at.is_some());

        // Completed jobs cannot be failed afterwards
        job.fail("too late");
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.failure.is_none());
    }

    #[test]
    fn test_rejection_counts_past_log_cap() {
        let mut job = ImportJob::new(GazetteerSource::Fast);
        for i in 0..(MAX_LOGGED_ERRORS + 10) {
            job.record_rejection(RejectedRow::missing_field(Some(i.to_string()), "label"));
        }
        assert_eq!(job.records_rejected as usize, MAX_LOGGED_ERRORS + 10);
        assert_eq!(job.errors.len(), MAX_LOGGED_ERRORS);
    }

    #[test]
    fn test_fail_records_reason() {
        let mut job = ImportJob::new(GazetteerSource::Wof);
        job.fail("payload unreadable");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure.as_deref(), Some("payload unreadable"));
    }
}
