//! Sync orchestration
//!
//! The [`SyncService`] facade is the entry point callers use: it creates
//! jobs, spawns one pipeline task per run, and answers job queries. The
//! pipeline itself lives in [`pipeline`]; per-entity import logic in the
//! sibling modules.

pub mod pipeline;

mod invoices;
mod journals;
mod suppliers;
mod transactions;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledgersync_domain::{
    Result, SyncEntity, SyncError, SyncJob, SyncJobStatus,
};
use serde::Serialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

pub use pipeline::{PipelineDeps, PipelineRunner};

/// Tenant-level rollup of sync activity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatistics {
    pub total_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    /// Completed / (completed + failed); 0 when no terminal jobs exist.
    pub success_rate: f64,
    pub total_imported: u64,
    pub total_updated: u64,
    pub last_completed_at: Option<DateTime<Utc>>,
}

/// Public orchestration surface over jobs and pipeline runs.
pub struct SyncService {
    runner: Arc<PipelineRunner>,
}

impl SyncService {
    #[must_use]
    pub fn new(runner: Arc<PipelineRunner>) -> Self {
        Self { runner }
    }

    /// Create a pending job for the integration and spawn its pipeline run.
    /// Returns the job immediately; progress is observable through
    /// [`get_sync_job`](Self::get_sync_job).
    #[instrument(skip(self), fields(tenant_id = %tenant_id, integration_id = %integration_id))]
    pub async fn trigger_sync(
        &self,
        tenant_id: Uuid,
        integration_id: Uuid,
        entity: SyncEntity,
    ) -> Result<SyncJob> {
        let integration = self
            .runner
            .deps()
            .integrations
            .find_by_id(integration_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("integration {integration_id}")))?;
        if integration.tenant_id != tenant_id {
            return Err(SyncError::NotFound(format!("integration {integration_id}")));
        }

        let job = SyncJob::new(tenant_id, integration_id, integration.provider, entity);
        self.runner.deps().jobs.save(&job).await?;
        info!(job_id = %job.id, entity = entity.as_str(), "sync job triggered");

        self.spawn_run(job.id);
        Ok(job)
    }

    pub async fn get_sync_jobs(&self, tenant_id: Uuid) -> Result<Vec<SyncJob>> {
        self.runner.deps().jobs.find_by_tenant(tenant_id).await
    }

    pub async fn get_sync_job(&self, job_id: Uuid) -> Result<SyncJob> {
        self.runner
            .deps()
            .jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("sync job {job_id}")))
    }

    /// Mark a job cancelled. Cancellation is between-runs only: a running
    /// pipeline finishes its current run, and the job can be restarted
    /// later.
    pub async fn cancel_sync_job(&self, job_id: Uuid) -> Result<SyncJob> {
        let mut job = self.get_sync_job(job_id).await?;
        job.cancel()?;
        self.runner.deps().jobs.save(&job).await?;
        Ok(job)
    }

    /// Restart a failed or cancelled job and spawn a fresh run.
    pub async fn retry_sync_job(&self, job_id: Uuid) -> Result<SyncJob> {
        let mut job = self.get_sync_job(job_id).await?;
        job.restart()?;
        self.runner.deps().jobs.save(&job).await?;
        info!(job_id = %job.id, "sync job restarted");

        self.spawn_run(job.id);
        Ok(job)
    }

    /// Rollup of all jobs for a tenant.
    pub async fn get_sync_statistics(&self, tenant_id: Uuid) -> Result<SyncStatistics> {
        let jobs = self.get_sync_jobs(tenant_id).await?;
        Ok(statistics_from(&jobs))
    }

    fn spawn_run(&self, job_id: Uuid) {
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            if let Err(e) = runner.run(job_id).await {
                // The runner already persisted the failed state; this is the
                // last place the error is observable.
                error!(job_id = %job_id, error = %e, "sync run failed");
            }
        });
    }
}

fn statistics_from(jobs: &[SyncJob]) -> SyncStatistics {
    let mut stats = SyncStatistics { total_jobs: jobs.len() as u64, ..SyncStatistics::default() };

    for job in jobs {
        match job.status {
            SyncJobStatus::Completed => {
                stats.completed_jobs += 1;
                if let Some(outcome) = &job.outcome {
                    stats.total_imported += outcome.imported;
                    stats.total_updated += outcome.updated;
                }
                if job.finished_at > stats.last_completed_at {
                    stats.last_completed_at = job.finished_at;
                }
            }
            SyncJobStatus::Failed => stats.failed_jobs += 1,
            _ => {}
        }
    }

    let terminal = stats.completed_jobs + stats.failed_jobs;
    if terminal > 0 {
        #[allow(clippy::cast_precision_loss)]
        {
            stats.success_rate = stats.completed_jobs as f64 / terminal as f64;
        }
    }
    stats
}
