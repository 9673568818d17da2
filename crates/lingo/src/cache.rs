use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::catalog::Catalog;

/// One cache slot: a finished catalog, or a watchable in-flight load that
/// publishes the catalog when resolution completes.
#[derive(Debug, Clone)]
pub enum CacheEntry {
    Ready(Arc<Catalog>),
    Pending(watch::Receiver<Option<Arc<Catalog>>>),
}

/// Process-wide map from `(locale key, domain)` to resolved or in-flight
/// catalogs.
///
/// The cache is checked, then populated; there is no atomic claim. Two
/// concurrent first-resolutions of the same key may both perform the full
/// load; both results are equal and the last store wins. Pending entries
/// exist so that callers arriving during a load can await it instead of
/// starting a third one.
#[derive(Debug, Default)]
pub struct CatalogCache {
    entries: Mutex<HashMap<(String, String), CacheEntry>>,
}

fn cache_key(locale_key: &str, domain: &str) -> (String, String) {
    (locale_key.to_string(), domain.to_string())
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, locale_key: &str, domain: &str) -> Option<CacheEntry> {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .get(&cache_key(locale_key, domain))
            .cloned()
    }

    /// Store a completed catalog, normalizing it to the canonical shape
    /// first, and hand back the shared copy.
    pub fn store_ready(&self, locale_key: &str, domain: &str, mut catalog: Catalog) -> Arc<Catalog> {
        catalog.normalize();
        let shared = Arc::new(catalog);
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(
                cache_key(locale_key, domain),
                CacheEntry::Ready(shared.clone()),
            );
        shared
    }

    /// Publish an in-flight load so concurrent callers can await it.
    pub fn store_pending(
        &self,
        locale_key: &str,
        domain: &str,
        waiter: watch::Receiver<Option<Arc<Catalog>>>,
    ) {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(cache_key(locale_key, domain), CacheEntry::Pending(waiter));
    }

    /// Drop every entry. Used for explicit invalidation and test isolation.
    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
