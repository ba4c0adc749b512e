//! In-memory test doubles for the pipeline's ports.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use ledgersync_core::{
    AccountRepository, IntegrationRepository, InvoiceRepository, JournalRepository,
    ProviderClient, ReconciliationService, SupplierRepository, SyncJobRepository,
    TokenLifecycleService, TokenRefresher, TransactionRepository,
};
use ledgersync_core::ProviderCredentials;
use ledgersync_domain::{
    BankTransaction, Integration, Invoice, LedgerAccount, ManualJournal, PageQuery, Provider,
    Result, Supplier, SyncError, SyncJob, TokenSet,
};
use ledgersync_infra::{PipelineDeps, PipelineRunner, SyncSettings};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize logging for tests (once), honoring `RUST_LOG`.
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

/// Integration with a healthy token and full credentials.
pub fn active_integration() -> Integration {
    let mut integration = Integration::new(
        Uuid::new_v4(),
        Provider::Xero,
        json!({
            "access_token": "test-access",
            "refresh_token": "test-refresh",
            "provider_tenant_id": "xero-tenant",
            "expires_at": Utc::now() + Duration::hours(1),
        }),
    );
    integration.activate();
    integration
}

#[derive(Default)]
pub struct InMemoryStore {
    pub integrations: Mutex<HashMap<Uuid, Integration>>,
    pub jobs: Mutex<HashMap<Uuid, SyncJob>>,
    pub accounts: Mutex<Vec<LedgerAccount>>,
    pub suppliers: Mutex<Vec<Supplier>>,
    pub invoices: Mutex<Vec<Invoice>>,
    pub transactions: Mutex<Vec<BankTransaction>>,
    pub journals: Mutex<Vec<ManualJournal>>,
}

#[async_trait]
impl IntegrationRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Integration>> {
        Ok(self.integrations.lock().await.get(&id).cloned())
    }

    async fn save(&self, integration: &Integration) -> Result<()> {
        self.integrations.lock().await.insert(integration.id, integration.clone());
        Ok(())
    }
}

#[async_trait]
impl SyncJobRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<SyncJob>> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn find_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<SyncJob>> {
        let mut jobs: Vec<SyncJob> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|j| j.tenant_id == tenant_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn save(&self, job: &SyncJob) -> Result<()> {
        self.jobs.lock().await.insert(job.id, job.clone());
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn accounts_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<LedgerAccount>> {
        Ok(self.accounts.lock().await.iter().filter(|a| a.tenant_id == tenant_id).cloned().collect())
    }
}

#[async_trait]
impl SupplierRepository for InMemoryStore {
    async fn suppliers_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Supplier>> {
        Ok(self.suppliers.lock().await.iter().filter(|s| s.tenant_id == tenant_id).cloned().collect())
    }

    async fn find_by_provider_id(
        &self,
        tenant_id: Uuid,
        integration_id: Uuid,
        provider_id: &str,
    ) -> Result<Option<Supplier>> {
        Ok(self
            .suppliers
            .lock()
            .await
            .iter()
            .find(|s| {
                s.tenant_id == tenant_id
                    && s.integration_id == integration_id
                    && s.provider_id == provider_id
            })
            .cloned())
    }

    async fn save(&self, supplier: &Supplier) -> Result<()> {
        let mut suppliers = self.suppliers.lock().await;
        if let Some(existing) = suppliers.iter_mut().find(|s| s.id == supplier.id) {
            *existing = supplier.clone();
        } else {
            suppliers.push(supplier.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryStore {
    async fn invoices_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Invoice>> {
        Ok(self.invoices.lock().await.iter().filter(|i| i.tenant_id == tenant_id).cloned().collect())
    }

    async fn find_by_provider_id(
        &self,
        tenant_id: Uuid,
        integration_id: Uuid,
        provider_id: &str,
    ) -> Result<Option<Invoice>> {
        Ok(self
            .invoices
            .lock()
            .await
            .iter()
            .find(|i| {
                i.tenant_id == tenant_id
                    && i.integration_id == integration_id
                    && i.provider_id == provider_id
            })
            .cloned())
    }

    async fn save(&self, invoice: &Invoice) -> Result<()> {
        let mut invoices = self.invoices.lock().await;
        if let Some(existing) = invoices.iter_mut().find(|i| i.id == invoice.id) {
            *existing = invoice.clone();
        } else {
            invoices.push(invoice.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for InMemoryStore {
    async fn transactions_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<BankTransaction>> {
        Ok(self
            .transactions
            .lock()
            .await
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn find_by_provider_id(
        &self,
        tenant_id: Uuid,
        integration_id: Uuid,
        provider_id: &str,
    ) -> Result<Option<BankTransaction>> {
        Ok(self
            .transactions
            .lock()
            .await
            .iter()
            .find(|t| {
                t.tenant_id == tenant_id
                    && t.integration_id == integration_id
                    && t.provider_id == provider_id
            })
            .cloned())
    }

    async fn save(&self, transaction: &BankTransaction) -> Result<()> {
        let mut transactions = self.transactions.lock().await;
        if let Some(existing) = transactions.iter_mut().find(|t| t.id == transaction.id) {
            *existing = transaction.clone();
        } else {
            transactions.push(transaction.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl JournalRepository for InMemoryStore {
    async fn find_by_provider_id(
        &self,
        tenant_id: Uuid,
        integration_id: Uuid,
        provider_id: &str,
    ) -> Result<Option<ManualJournal>> {
        Ok(self
            .journals
            .lock()
            .await
            .iter()
            .find(|j| {
                j.tenant_id == tenant_id
                    && j.integration_id == integration_id
                    && j.provider_id == provider_id
            })
            .cloned())
    }

    async fn save(&self, journal: &ManualJournal) -> Result<()> {
        let mut journals = self.journals.lock().await;
        if let Some(existing) = journals.iter_mut().find(|j| j.id == journal.id) {
            *existing = journal.clone();
        } else {
            journals.push(journal.clone());
        }
        Ok(())
    }
}

/// Serves preconfigured record pages and counts fetch calls.
pub struct PagedMockClient {
    pub pages: Vec<Vec<Value>>,
    pub fetches: AtomicU32,
    pub failure: Option<SyncError>,
}

impl PagedMockClient {
    pub fn with_pages(pages: Vec<Vec<Value>>) -> Self {
        Self { pages, fetches: AtomicU32::new(0), failure: None }
    }

    pub fn failing(failure: SyncError) -> Self {
        Self { pages: vec![], fetches: AtomicU32::new(0), failure: Some(failure) }
    }

    fn page(&self, query: &PageQuery) -> Result<Vec<Value>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        Ok(self.pages.get(query.page as usize - 1).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ProviderClient for PagedMockClient {
    fn provider(&self) -> Provider {
        Provider::Xero
    }

    async fn fetch_transactions(&self, query: &PageQuery) -> Result<Vec<Value>> {
        self.page(query)
    }

    async fn fetch_suppliers(&self, query: &PageQuery) -> Result<Vec<Value>> {
        self.page(query)
    }

    async fn fetch_invoices(&self, query: &PageQuery) -> Result<Vec<Value>> {
        self.page(query)
    }

    async fn fetch_journals(&self, query: &PageQuery) -> Result<Vec<Value>> {
        self.page(query)
    }
}

/// Token refresher that always succeeds with a fixed token set.
pub struct StaticRefresher;

#[async_trait]
impl TokenRefresher for StaticRefresher {
    fn provider(&self) -> Provider {
        Provider::Xero
    }

    async fn refresh(&self, _credentials: &ProviderCredentials) -> Result<TokenSet> {
        Ok(TokenSet::new("refreshed-access".into(), Some("refreshed-rt".into()), 1800))
    }
}

/// Wire a runner around one store and one mock client.
pub fn runner_with(
    store: Arc<InMemoryStore>,
    client: Arc<dyn ProviderClient>,
    settings: SyncSettings,
) -> PipelineRunner {
    init_test_logging();
    let reconcile = Arc::new(ReconciliationService::new(
        Arc::clone(&store) as Arc<dyn AccountRepository>,
        Arc::clone(&store) as Arc<dyn SupplierRepository>,
        Arc::clone(&store) as Arc<dyn InvoiceRepository>,
        Arc::clone(&store) as Arc<dyn TransactionRepository>,
    ));
    let tokens = Arc::new(TokenLifecycleService::new(vec![Arc::new(StaticRefresher)]));

    PipelineRunner::new(
        PipelineDeps {
            integrations: Arc::clone(&store) as Arc<dyn IntegrationRepository>,
            jobs: Arc::clone(&store) as Arc<dyn SyncJobRepository>,
            accounts: Arc::clone(&store) as Arc<dyn AccountRepository>,
            suppliers: Arc::clone(&store) as Arc<dyn SupplierRepository>,
            invoices: Arc::clone(&store) as Arc<dyn InvoiceRepository>,
            transactions: Arc::clone(&store) as Arc<dyn TransactionRepository>,
            journals: Arc::clone(&store) as Arc<dyn JournalRepository>,
            client,
            tokens,
            reconcile,
        },
        settings,
    )
}

/// Settings tuned for fast tests.
pub fn fast_settings(page_size: u32) -> SyncSettings {
    SyncSettings {
        page_size,
        max_pages: 10,
        batch_size: 10,
        max_retries: 2,
        page_delay: std::time::Duration::from_millis(0),
        http_timeout: std::time::Duration::from_secs(5),
    }
}

/// Generic transaction record in the engine's normalized shape.
pub fn transaction_record(id: &str, amount: f64) -> Value {
    json!({
        "transaction_id": id,
        "date": "2024-06-05",
        "amount": amount,
        "reference": format!("ref-{id}"),
    })
}
