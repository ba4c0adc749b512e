//! # LedgerSync Domain
//!
//! Domain layer for the provider synchronization engine.
//!
//! This crate contains:
//! - The `SyncError` taxonomy shared by every layer
//! - The `Integration` and `SyncJob` aggregates
//! - Internal ledger entities and provider-shaped import DTOs
//!
//! No I/O, no async, no infrastructure dependencies.

pub mod errors;
pub mod types;

pub use errors::{Result, SyncError};
pub use types::dto::{
    PageQuery, ProviderInvoice, ProviderJournal, ProviderJournalLine, ProviderSupplier,
    ProviderTransaction,
};
pub use types::entities::{
    BankTransaction, Invoice, InvoiceStatus, JournalLine, LedgerAccount, ManualJournal, Supplier,
};
pub use types::integration::{AuthData, Integration, IntegrationStatus, SyncHealth, TokenSet};
pub use types::provider::Provider;
pub use types::sync_job::{SyncEntity, SyncJob, SyncJobStatus, SyncOutcome};
