//! Import pipeline runner
//!
//! Drives one sync job through fetch, transform, reconcile, and persist.
//! Pagination and batch persistence are strictly sequential within a run;
//! concurrency lives at the job level (one tokio task per run, each under
//! its own execution context).

use std::sync::Arc;

use ledgersync_core::{
    context, run_with_retry, AccountRepository, EntityLookupMaps, ExecutionContext,
    IntegrationRepository, InvalidationScope, InvoiceRepository, JournalRepository,
    ProviderClient, ReconciliationService, RetryPolicy, SupplierRepository, SyncJobRepository,
    TokenLifecycleService, TransactionRepository,
};
use ledgersync_domain::{
    Integration, PageQuery, Result, SyncEntity, SyncError, SyncJob, SyncJobStatus, SyncOutcome,
};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncSettings;
use crate::sync::{invoices, journals, suppliers, transactions};

/// Everything a pipeline run needs, shared across runs.
pub struct PipelineDeps {
    pub integrations: Arc<dyn IntegrationRepository>,
    pub jobs: Arc<dyn SyncJobRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub suppliers: Arc<dyn SupplierRepository>,
    pub invoices: Arc<dyn InvoiceRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub journals: Arc<dyn JournalRepository>,
    pub client: Arc<dyn ProviderClient>,
    pub tokens: Arc<TokenLifecycleService>,
    pub reconcile: Arc<ReconciliationService>,
}

/// Executes sync jobs end to end.
pub struct PipelineRunner {
    deps: PipelineDeps,
    settings: SyncSettings,
}

impl PipelineRunner {
    #[must_use]
    pub fn new(deps: PipelineDeps, settings: SyncSettings) -> Self {
        Self { deps, settings }
    }

    #[must_use]
    pub fn deps(&self) -> &PipelineDeps {
        &self.deps
    }

    /// Run one job to a terminal state. The returned error describes a
    /// run-level failure; the job and integration are persisted in their
    /// final state either way.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn run(&self, job_id: Uuid) -> Result<SyncJob> {
        let mut job = self
            .deps
            .jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("sync job {job_id}")))?;
        let mut integration = self
            .deps
            .integrations
            .find_by_id(job.integration_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("integration {}", job.integration_id)))?;

        // A freshly triggered job is Pending; a retried one arrives already
        // Running from `restart`.
        if job.status == SyncJobStatus::Pending {
            job.start()?;
        } else if job.status != SyncJobStatus::Running {
            return Err(SyncError::Job {
                retryable: false,
                message: format!("job {job_id} is not runnable from {:?}", job.status),
            });
        }
        self.deps.jobs.save(&job).await?;

        match self.execute(&mut job, &mut integration).await {
            Ok(outcome) => {
                info!(
                    imported = outcome.imported,
                    updated = outcome.updated,
                    skipped = outcome.skipped,
                    record_errors = outcome.errors.len(),
                    "sync job completed"
                );
                let changed = outcome.imported > 0 || outcome.updated > 0;
                job.complete(outcome)?;
                integration.record_successful_sync();
                if changed {
                    // Imports changed the entity stores; cached lookup maps
                    // for this pair are stale.
                    self.deps.reconcile.invalidate(InvalidationScope::Key(
                        integration.tenant_id,
                        integration.provider,
                    ));
                }
                self.persist(&job, &integration).await?;
                Ok(job)
            }
            Err(error) => {
                warn!(error = %error, "sync job failed");
                job.fail(&error.to_string())?;
                integration.record_sync_error(&error.to_string());
                self.persist(&job, &integration).await?;
                Err(error)
            }
        }
    }

    async fn persist(&self, job: &SyncJob, integration: &Integration) -> Result<()> {
        self.deps.jobs.save(job).await?;
        self.deps.integrations.save(integration).await
    }

    /// Token gate, fetch, transform, reconcile, persist.
    async fn execute(
        &self,
        job: &mut SyncJob,
        integration: &mut Integration,
    ) -> Result<SyncOutcome> {
        let refresh = self.deps.tokens.refresh_if_needed(integration).await;
        // The refresh mutates failure counters and auth data; persist before
        // deciding whether the run can proceed.
        self.deps.integrations.save(integration).await?;
        if !refresh.success {
            let message = refresh.error.unwrap_or_else(|| "token refresh failed".to_string());
            return Err(if refresh.needs_reauth {
                SyncError::AuthenticationRequired(message)
            } else {
                SyncError::TokenRefreshFailed(message)
            });
        }
        self.deps.tokens.validate(integration)?;

        let ctx = Arc::new(ExecutionContext::for_integration(integration)?);
        let snapshot = integration.clone();
        let settings = self.settings.clone();
        context::run(ctx, self.execute_inner(job, snapshot, settings)).await
    }

    async fn execute_inner(
        &self,
        job: &mut SyncJob,
        integration: Integration,
        settings: SyncSettings,
    ) -> Result<SyncOutcome> {
        let maps = self
            .deps
            .reconcile
            .lookup_maps(integration.tenant_id, integration.provider)
            .await?;

        let records = self.fetch_all(job.entity).await?;
        job.update_progress(10)?;
        self.deps.jobs.save(job).await?;

        let mut outcome = SyncOutcome::default();
        let total = records.len();
        let mut processed = 0_usize;

        for batch in records.chunks(settings.batch_size.max(1)) {
            self.import_batch(job.entity, &integration, &maps, batch, &mut outcome).await;
            processed += batch.len();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
            let percent = 10 + ((processed as f64 / total.max(1) as f64) * 90.0) as u8;
            job.update_progress(percent)?;
            self.deps.jobs.save(job).await?;
        }

        Ok(outcome)
    }

    /// Sequential page loop bounded by `max_pages`, each page wrapped in the
    /// retry executor; stops at the first short page.
    async fn fetch_all(&self, entity: SyncEntity) -> Result<Vec<Value>> {
        let policy = RetryPolicy::new(self.settings.max_retries);
        let mut records = Vec::new();

        for page in 1..=self.settings.max_pages {
            let query = PageQuery::new(page, self.settings.page_size);
            let batch = run_with_retry(policy, || self.fetch_page(entity, &query)).await?;
            let short_page = (batch.len() as u64) < u64::from(self.settings.page_size);
            records.extend(batch);
            if short_page {
                break;
            }
            tokio::time::sleep(self.settings.page_delay).await;
        }

        info!(entity = entity.as_str(), count = records.len(), "fetch phase finished");
        Ok(records)
    }

    async fn fetch_page(&self, entity: SyncEntity, query: &PageQuery) -> Result<Vec<Value>> {
        match entity {
            SyncEntity::Transactions => self.deps.client.fetch_transactions(query).await,
            SyncEntity::Suppliers => self.deps.client.fetch_suppliers(query).await,
            SyncEntity::Invoices => self.deps.client.fetch_invoices(query).await,
            SyncEntity::ManualJournals => self.deps.client.fetch_journals(query).await,
        }
    }

    async fn import_batch(
        &self,
        entity: SyncEntity,
        integration: &Integration,
        maps: &EntityLookupMaps,
        batch: &[Value],
        outcome: &mut SyncOutcome,
    ) {
        match entity {
            SyncEntity::Transactions => {
                transactions::import_batch(&self.deps, integration, maps, batch, outcome).await;
            }
            SyncEntity::Suppliers => {
                suppliers::import_batch(&self.deps, integration, batch, outcome).await;
            }
            SyncEntity::Invoices => {
                invoices::import_batch(&self.deps, integration, maps, batch, outcome).await;
            }
            SyncEntity::ManualJournals => {
                journals::import_batch(&self.deps, integration, batch, outcome).await;
            }
        }
    }
}
