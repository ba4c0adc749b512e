//! Sync engine configuration
//!
//! Settings come from `LEDGERSYNC_*` environment variables with hardcoded
//! defaults. An unparsable value falls back to the default with a warning
//! rather than aborting startup.

use std::time::Duration;

use tracing::warn;

const DEFAULT_PAGE_SIZE: u32 = 100;
const DEFAULT_MAX_PAGES: u32 = 50;
const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_PAGE_DELAY_MS: u64 = 200;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Tunables for fetch pagination, persistence batching, and retries.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Records requested per provider API page.
    pub page_size: u32,
    /// Hard cap on pages fetched in one run.
    pub max_pages: u32,
    /// Records persisted per batch.
    pub batch_size: usize,
    /// Attempts per provider call, including the first.
    pub max_retries: u32,
    /// Fixed pause between successful page fetches.
    pub page_delay: Duration,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl SyncSettings {
    /// Load settings from the environment, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            page_size: env_or("LEDGERSYNC_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            max_pages: env_or("LEDGERSYNC_MAX_PAGES", DEFAULT_MAX_PAGES),
            batch_size: env_or("LEDGERSYNC_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            max_retries: env_or("LEDGERSYNC_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            page_delay: Duration::from_millis(env_or(
                "LEDGERSYNC_PAGE_DELAY_MS",
                DEFAULT_PAGE_DELAY_MS,
            )),
            http_timeout: Duration::from_secs(env_or(
                "LEDGERSYNC_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}
