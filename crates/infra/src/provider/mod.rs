//! Provider API adapters
//!
//! One module per accounting provider. Each adapter implements the core
//! `ProviderClient` and `TokenRefresher` ports and normalizes provider
//! failures into the error taxonomy.

pub mod xero;

pub use xero::{XeroClient, XeroConfig, XeroTokenRefresher};
