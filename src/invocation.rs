//! `InvocationRegistry` (C9) — binds a `(cache, key)` pair to the `load_fn`
//! and [`CacheOptions`] that should run on a miss, the way an annotation-driven
//! cacheable-read call site would be registered once and invoked by key
//! thereafter.

use crate::engine::LoadFn;
use crate::options::CacheOptions;
use dashmap::DashMap;
use std::sync::Arc;

/// What [`crate::engine::ProtectionEngine`] runs for a given `(cache, key)`
/// on a miss.
pub struct InvocationRecord {
    pub load_fn: Arc<LoadFn>,
    pub options: CacheOptions,
}

/// Registry of known `(cache, key)` -> load behavior bindings.
#[derive(Default)]
pub struct InvocationRegistry {
    records: DashMap<(String, String), Arc<InvocationRecord>>,
}

impl InvocationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, cache: &str, key: &str, load_fn: Arc<LoadFn>, options: CacheOptions) {
        self.records.insert(
            (cache.to_string(), key.to_string()),
            Arc::new(InvocationRecord { load_fn, options }),
        );
    }

    #[must_use]
    pub fn get(&self, cache: &str, key: &str) -> Option<Arc<InvocationRecord>> {
        self.records
            .get(&(cache.to_string(), key.to_string()))
            .map(|entry| entry.clone())
    }

    pub fn unregister(&self, cache: &str, key: &str) {
        self.records.remove(&(cache.to_string(), key.to_string()));
    }

    /// Drops every binding for `cache`, e.g. alongside [`crate::MembershipFilter::clear`].
    pub fn unregister_all(&self, cache: &str) {
        self.records.retain(|(c, _), _| c != cache);
    }
}
