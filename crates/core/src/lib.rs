//! # LedgerSync Core
//!
//! Business logic layer for the provider synchronization engine.
//!
//! This crate contains:
//! - Request-scoped execution contexts with task-local propagation
//! - Token lifecycle management (health, refresh, reauth escalation)
//! - Entity reconciliation with tenant-partitioned lookup caches
//! - Error classification and the data-driven retry policy
//! - Port traits implemented by the infrastructure layer
//!
//! ## Architecture Principles
//! - Only depends on `ledgersync-domain`
//! - No HTTP or storage code; all I/O via traits
//! - Pure, testable business logic

pub mod classify;
pub mod context;
pub mod ports;
pub mod reconcile;
pub mod retry;
pub mod token;

pub use classify::{retry_delay, to_sync_error};
pub use context::{current, require_current, run, ExecutionContext, ProviderCredentials};
pub use ports::{
    AccountRepository, IntegrationRepository, InvoiceRepository, JournalRepository,
    ProviderClient, SupplierRepository, SyncJobRepository, TokenRefresher,
    TransactionRepository,
};
pub use reconcile::cache::{CacheKey, InvalidationScope, LookupCache};
pub use reconcile::{EntityLookupMaps, ReconciliationService, TransactionProbe};
pub use retry::{run_with_retry, RetryPolicy};
pub use token::{RefreshResult, TokenHealth, TokenLifecycleService};
