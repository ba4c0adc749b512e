//! Lookup map cache
//!
//! Built lookup maps are keyed by `(tenant, provider)` so one tenant's
//! rebuild never evicts another's. Racing rebuilds are allowed; the last
//! writer wins, which is safe because every build reads the same stores.

use dashmap::DashMap;
use ledgersync_domain::Provider;
use std::sync::Arc;
use uuid::Uuid;

use super::EntityLookupMaps;

/// Cache key: one entry per tenant/provider pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tenant_id: Uuid,
    pub provider: Provider,
}

/// How much of the cache to drop.
#[derive(Debug, Clone, Copy)]
pub enum InvalidationScope {
    All,
    Tenant(Uuid),
    Key(Uuid, Provider),
}

/// Concurrent cache of built lookup maps.
#[derive(Debug, Default)]
pub struct LookupCache {
    entries: DashMap<CacheKey, Arc<EntityLookupMaps>>,
}

impl LookupCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Arc<EntityLookupMaps>> {
        self.entries.get(key).map(|entry| Arc::clone(&entry))
    }

    pub fn put(&self, key: CacheKey, maps: Arc<EntityLookupMaps>) {
        self.entries.insert(key, maps);
    }

    pub fn invalidate(&self, scope: InvalidationScope) {
        match scope {
            InvalidationScope::All => self.entries.clear(),
            InvalidationScope::Tenant(tenant_id) => {
                self.entries.retain(|key, _| key.tenant_id != tenant_id);
            }
            InvalidationScope::Key(tenant_id, provider) => {
                self.entries.remove(&CacheKey { tenant_id, provider });
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
