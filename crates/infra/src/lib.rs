//! # LedgerSync Infrastructure
//!
//! Infrastructure layer of the provider synchronization engine:
//! - Provider API adapters (HTTP clients, token refreshers)
//! - Import pipelines and the sync orchestration facade
//! - Environment-based configuration
//!
//! Everything here implements ports defined in `ledgersync-core`; business
//! rules stay in the core and domain crates.

pub mod config;
pub mod provider;
pub mod sync;

pub use config::SyncSettings;
pub use provider::{XeroClient, XeroConfig, XeroTokenRefresher};
pub use sync::{PipelineDeps, PipelineRunner, SyncService, SyncStatistics};
