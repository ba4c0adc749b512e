//! Port interfaces implemented by the infrastructure layer
//!
//! All persistence and provider I/O goes through these traits. The core
//! never sees a database handle or an HTTP client.

use async_trait::async_trait;
use ledgersync_domain::{
    BankTransaction, Integration, Invoice, LedgerAccount, ManualJournal, PageQuery, Provider,
    Result, Supplier, SyncJob, TokenSet,
};
use serde_json::Value;
use uuid::Uuid;

use crate::context::ProviderCredentials;

/// Integration aggregate persistence.
#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Integration>>;

    async fn save(&self, integration: &Integration) -> Result<()>;
}

/// SyncJob aggregate persistence.
#[async_trait]
pub trait SyncJobRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<SyncJob>>;

    /// All jobs for a tenant, most recent first.
    async fn find_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<SyncJob>>;

    async fn save(&self, job: &SyncJob) -> Result<()>;
}

/// Chart-of-accounts reads for lookup map building.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn accounts_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<LedgerAccount>>;
}

/// Supplier reads and writes.
#[async_trait]
pub trait SupplierRepository: Send + Sync {
    async fn suppliers_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Supplier>>;

    async fn find_by_provider_id(
        &self,
        tenant_id: Uuid,
        integration_id: Uuid,
        provider_id: &str,
    ) -> Result<Option<Supplier>>;

    async fn save(&self, supplier: &Supplier) -> Result<()>;
}

/// Invoice reads and writes.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn invoices_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Invoice>>;

    async fn find_by_provider_id(
        &self,
        tenant_id: Uuid,
        integration_id: Uuid,
        provider_id: &str,
    ) -> Result<Option<Invoice>>;

    async fn save(&self, invoice: &Invoice) -> Result<()>;
}

/// Bank transaction reads and writes.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn transactions_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<BankTransaction>>;

    async fn find_by_provider_id(
        &self,
        tenant_id: Uuid,
        integration_id: Uuid,
        provider_id: &str,
    ) -> Result<Option<BankTransaction>>;

    async fn save(&self, transaction: &BankTransaction) -> Result<()>;
}

/// Manual journal reads and writes.
#[async_trait]
pub trait JournalRepository: Send + Sync {
    async fn find_by_provider_id(
        &self,
        tenant_id: Uuid,
        integration_id: Uuid,
        provider_id: &str,
    ) -> Result<Option<ManualJournal>>;

    async fn save(&self, journal: &ManualJournal) -> Result<()>;
}

/// Accounting provider API client.
///
/// Implementations draw credentials exclusively from the current
/// [`ExecutionContext`](crate::context::ExecutionContext) and surface every
/// failure as an already-classified `SyncError` (structured status codes, not
/// free-text messages). Adapters normalize the provider's wire format into
/// the engine's generic record shape; the transform phase validates those
/// records into DTOs.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn fetch_transactions(&self, query: &PageQuery) -> Result<Vec<Value>>;

    async fn fetch_suppliers(&self, query: &PageQuery) -> Result<Vec<Value>>;

    async fn fetch_invoices(&self, query: &PageQuery) -> Result<Vec<Value>>;

    async fn fetch_journals(&self, query: &PageQuery) -> Result<Vec<Value>>;
}

/// One token refresh path per supported provider.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    fn provider(&self) -> Provider;

    /// Exchange the refresh token for a new token set.
    async fn refresh(&self, credentials: &ProviderCredentials) -> Result<TokenSet>;
}
