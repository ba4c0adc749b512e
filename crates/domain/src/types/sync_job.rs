//! SyncJob aggregate
//!
//! One run of an import pipeline, with its own lifecycle state machine and
//! progress tracking. Restart is only legal from a terminal failure state,
//! and progress is monotonic within a single run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{Result, SyncError};
use crate::types::provider::Provider;

/// Entity family a sync job imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntity {
    Transactions,
    Suppliers,
    Invoices,
    ManualJournals,
}

impl SyncEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transactions => "transactions",
            Self::Suppliers => "suppliers",
            Self::Invoices => "invoices",
            Self::ManualJournals => "manual_journals",
        }
    }
}

/// Lifecycle states of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Aggregated result of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub imported: u64,
    pub updated: u64,
    pub skipped: u64,
    /// Per-record error strings; a non-empty list with a completed job is a
    /// valid partial-success outcome.
    pub errors: Vec<String>,
}

/// One run of an import pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub integration_id: Uuid,
    pub provider: Provider,
    pub entity: SyncEntity,
    pub status: SyncJobStatus,
    /// Percent complete, 0-100, monotonic within one run.
    pub progress: u8,
    pub outcome: Option<SyncOutcome>,
    pub failure_reason: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SyncJob {
    /// Create a new pending job for one integration and entity family.
    #[must_use]
    pub fn new(tenant_id: Uuid, integration_id: Uuid, provider: Provider, entity: SyncEntity) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            integration_id,
            provider,
            entity,
            status: SyncJobStatus::Pending,
            progress: 0,
            outcome: None,
            failure_reason: None,
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        }
    }

    /// Transition Pending -> Running.
    pub fn start(&mut self) -> Result<()> {
        if self.status != SyncJobStatus::Pending {
            return Err(self.illegal_transition("start"));
        }
        self.status = SyncJobStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Restart a failed or cancelled job; resets progress and result.
    pub fn restart(&mut self) -> Result<()> {
        if !matches!(self.status, SyncJobStatus::Failed | SyncJobStatus::Cancelled) {
            return Err(self.illegal_transition("restart"));
        }
        self.status = SyncJobStatus::Running;
        self.progress = 0;
        self.outcome = None;
        self.failure_reason = None;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        Ok(())
    }

    /// Report progress. Values above 100 are clamped; regressions within a
    /// run are ignored rather than rejected.
    pub fn update_progress(&mut self, percent: u8) -> Result<()> {
        if self.status != SyncJobStatus::Running {
            return Err(self.illegal_transition("update_progress"));
        }
        let percent = percent.min(100);
        if percent > self.progress {
            self.progress = percent;
        }
        Ok(())
    }

    /// Transition Running -> Completed with the run's outcome.
    pub fn complete(&mut self, outcome: SyncOutcome) -> Result<()> {
        if self.status != SyncJobStatus::Running {
            return Err(self.illegal_transition("complete"));
        }
        self.status = SyncJobStatus::Completed;
        self.progress = 100;
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Transition Running -> Failed with the run-level failure reason.
    pub fn fail(&mut self, reason: &str) -> Result<()> {
        if self.status != SyncJobStatus::Running {
            return Err(self.illegal_transition("fail"));
        }
        self.status = SyncJobStatus::Failed;
        self.failure_reason = Some(reason.to_string());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Cancel a pending or running job. Idempotent for already-cancelled jobs.
    pub fn cancel(&mut self) -> Result<()> {
        match self.status {
            SyncJobStatus::Pending | SyncJobStatus::Running => {
                self.status = SyncJobStatus::Cancelled;
                self.finished_at = Some(Utc::now());
                Ok(())
            }
            SyncJobStatus::Cancelled => Ok(()),
            _ => Err(self.illegal_transition("cancel")),
        }
    }

    /// Whether the job is in a state `restart` accepts.
    pub fn is_restartable(&self) -> bool {
        matches!(self.status, SyncJobStatus::Failed | SyncJobStatus::Cancelled)
    }

    fn illegal_transition(&self, operation: &str) -> SyncError {
        SyncError::Job {
            retryable: false,
            message: format!("cannot {operation} sync job in state {:?}", self.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> SyncJob {
        SyncJob::new(Uuid::new_v4(), Uuid::new_v4(), Provider::Xero, SyncEntity::Transactions)
    }

    #[test]
    fn start_is_only_legal_from_pending() {
        let mut j = job();
        j.start().unwrap();
        assert_eq!(j.status, SyncJobStatus::Running);
        assert!(j.started_at.is_some());
        assert!(j.start().is_err());
    }

    #[test]
    fn restart_only_from_failed_or_cancelled() {
        let mut j = job();
        assert!(j.restart().is_err());

        j.start().unwrap();
        j.update_progress(40).unwrap();
        j.fail("provider down").unwrap();
        j.restart().unwrap();
        assert_eq!(j.status, SyncJobStatus::Running);
        assert_eq!(j.progress, 0);
        assert!(j.failure_reason.is_none());
        assert!(j.finished_at.is_none());

        j.cancel().unwrap();
        j.restart().unwrap();
        assert_eq!(j.status, SyncJobStatus::Running);
    }

    #[test]
    fn progress_is_monotonic_and_clamped() {
        let mut j = job();
        j.start().unwrap();
        j.update_progress(30).unwrap();
        j.update_progress(10).unwrap();
        assert_eq!(j.progress, 30);
        j.update_progress(150).unwrap();
        assert_eq!(j.progress, 100);
    }

    #[test]
    fn complete_records_outcome_and_finishes() {
        let mut j = job();
        j.start().unwrap();
        let outcome =
            SyncOutcome { imported: 5, updated: 2, skipped: 1, errors: vec!["bad row".into()] };
        j.complete(outcome.clone()).unwrap();
        assert_eq!(j.status, SyncJobStatus::Completed);
        assert_eq!(j.progress, 100);
        assert_eq!(j.outcome, Some(outcome));
        assert!(j.complete(SyncOutcome::default()).is_err());
    }

    #[test]
    fn cancel_is_idempotent_but_not_from_completed() {
        let mut j = job();
        j.cancel().unwrap();
        j.cancel().unwrap();
        assert_eq!(j.status, SyncJobStatus::Cancelled);

        let mut done = job();
        done.start().unwrap();
        done.complete(SyncOutcome::default()).unwrap();
        assert!(done.cancel().is_err());
    }

    #[test]
    fn illegal_transition_is_a_non_retryable_job_error() {
        let mut j = job();
        let err = j.update_progress(10).unwrap_err();
        match err {
            SyncError::Job { retryable, .. } => assert!(!retryable),
            other => panic!("expected job error, got {other:?}"),
        }
    }
}
