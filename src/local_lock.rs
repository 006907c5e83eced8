//! `LocalLockRegistry` (C4) — in-process breakdown defense.
//!
//! A `DashMap<(cache, key), Arc<Mutex<()>>>` holds one lock per in-flight
//! key, and an RAII guard removes the map entry on drop. Keyed on
//! `(cache, key)` pairs and tracks a waiter count so the entry is only
//! reclaimed once the last holder has released and no one else is queued
//! behind it.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{timeout, Duration};

struct Slot {
    mutex: Arc<Mutex<()>>,
    waiters: AtomicUsize,
}

/// Per-cache-instance registry of in-flight (cache, key) locks.
#[derive(Default)]
pub struct LocalLockRegistry {
    slots: DashMap<(String, String), Arc<Slot>>,
}

/// Held lock for a single (cache, key) pair. Releases on drop.
pub struct LockHandle {
    registry: Arc<LocalLockRegistry>,
    key: (String, String),
    slot: Arc<Slot>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl LocalLockRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_for(&self, cache: &str, key: &str) -> Arc<Slot> {
        let composite = (cache.to_string(), key.to_string());
        let slot = self
            .slots
            .entry(composite)
            .or_insert_with(|| {
                Arc::new(Slot {
                    mutex: Arc::new(Mutex::new(())),
                    waiters: AtomicUsize::new(0),
                })
            })
            .clone();
        slot.waiters.fetch_add(1, Ordering::SeqCst);
        slot
    }

    /// Blocks until the lock for `(cache, key)` is held by no one else.
    pub async fn acquire(self: &Arc<Self>, cache: &str, key: &str) -> LockHandle {
        let slot = self.slot_for(cache, key);
        let guard = slot.mutex.clone().lock_owned().await;
        LockHandle {
            registry: self.clone(),
            key: (cache.to_string(), key.to_string()),
            slot,
            guard: Some(guard),
        }
    }

    /// Returns `None` if the lock isn't free within `timeout_duration`.
    pub async fn try_acquire(
        self: &Arc<Self>,
        cache: &str,
        key: &str,
        timeout_duration: Duration,
    ) -> Option<LockHandle> {
        let slot = self.slot_for(cache, key);
        if let Ok(guard) = timeout(timeout_duration, slot.mutex.clone().lock_owned()).await { Some(LockHandle {
            registry: self.clone(),
            key: (cache.to_string(), key.to_string()),
            slot,
            guard: Some(guard),
        }) } else {
            slot.waiters.fetch_sub(1, Ordering::SeqCst);
            None
        }
    }
}

impl LockHandle {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.guard = None;
        if self.slot.waiters.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.registry
                .slots
                .remove_if(&self.key, |_, slot| Arc::ptr_eq(slot, &self.slot));
        }
    }
}
