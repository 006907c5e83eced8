//! `ProtectionEngine` (C8) — the handler chain tying C1-C7/C9 together:
//! membership gate, read+classify, breakdown lock, load, write-back.
//!
//! The chain is a single linear function per the "collapse overlapping
//! strategies into one handler chain" design note; pluggability comes from
//! [`CacheOptions`] flags, not from swapping handler implementations.

use crate::entry::{now_ms, CachedEntry};
use crate::error::GuardError;
use crate::invocation::InvocationRegistry;
use crate::kv_store::KvStore;
use crate::lease::{DistributedLease, Lease};
use crate::local_lock::{LocalLockRegistry, LockHandle};
use crate::membership::MembershipFilter;
use crate::options::{CacheOptions, PreRefreshMode, StorageKey};
use crate::refresh::RefreshScheduler;
use crate::ttl::TtlPolicy;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Future returned by a [`LoadFn`] invocation.
pub type LoadFuture = Pin<Box<dyn Future<Output = anyhow::Result<Option<Vec<u8>>>> + Send>>;

/// The origin call the engine invokes on a miss. Callable more than once:
/// a single registration may back both the triggering read and a later
/// background pre-refresh.
pub type LoadFn = dyn Fn() -> LoadFuture + Send + Sync;

/// Outcome of [`ProtectionEngine::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Value(Vec<u8>),
    Null,
    Empty,
    Blocked,
}

/// A single logical read, as the (out-of-scope) interception layer would
/// build it from an intercepted cacheable method call.
pub struct ReadRequest {
    pub cache: String,
    pub key: String,
    pub options: CacheOptions,
    pub load_fn: Arc<LoadFn>,
    /// Advisory decoder hint stored in the entry's `type` field.
    pub type_tag: String,
    pub cancel: Option<watch::Receiver<bool>>,
}

impl ReadRequest {
    pub fn new(cache: impl Into<String>, key: impl Into<String>, load_fn: Arc<LoadFn>) -> Self {
        Self {
            cache: cache.into(),
            key: key.into(),
            options: CacheOptions::default(),
            load_fn,
            type_tag: String::new(),
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

pub struct ProtectionEngine {
    kv: Arc<dyn KvStore>,
    filter: MembershipFilter,
    local_locks: Arc<LocalLockRegistry>,
    lease: Option<DistributedLease>,
    scheduler: Arc<RefreshScheduler>,
    invocations: InvocationRegistry,
}

impl ProtectionEngine {
    pub fn new(
        kv: Arc<dyn KvStore>,
        filter: MembershipFilter,
        local_locks: Arc<LocalLockRegistry>,
        lease: Option<DistributedLease>,
        scheduler: Arc<RefreshScheduler>,
        invocations: InvocationRegistry,
    ) -> Arc<Self> {
        Arc::new(Self {
            kv,
            filter,
            local_locks,
            lease,
            scheduler,
            invocations,
        })
    }

    pub fn register_invocation(
        &self,
        cache: &str,
        key: &str,
        load_fn: Arc<LoadFn>,
        options: CacheOptions,
    ) {
        self.invocations.register(cache, key, load_fn, options);
    }

    pub async fn evict(&self, cache: &str, key: &str) {
        let storage_key = StorageKey::new(cache, key);
        if let Err(err) = self.kv.delete(storage_key.as_str()).await {
            warn!(key = %storage_key.as_str(), error = %err, "evict: kv delete failed");
        }
    }

    /// Deletes every key under `cache` and resets the cache's membership
    /// filter and invocation bindings. Other caches are unaffected.
    pub async fn evict_all(&self, cache: &str) {
        let prefix = StorageKey::scan_prefix(cache);
        match self.kv.scan(&prefix).await {
            Ok(keys) => {
                for k in keys {
                    if let Err(err) = self.kv.delete(&k).await {
                        warn!(key = %k, error = %err, "evict_all: kv delete failed");
                    }
                }
            }
            Err(err) => warn!(cache = %cache, error = %err, "evict_all: kv scan failed"),
        }
        self.filter.clear(cache);
        self.invocations.unregister_all(cache);
    }

    pub async fn get(self: &Arc<Self>, request: ReadRequest) -> Result<ReadOutcome, GuardError> {
        let ReadRequest {
            cache,
            key,
            options,
            load_fn,
            type_tag,
            mut cancel,
        } = request;

        self.invocations
            .register(&cache, &key, load_fn.clone(), options.clone());

        // H1 — MembershipGate
        if options.use_membership_filter && !self.filter.might_contain(&cache, &key) {
            debug!(cache = %cache, key = %key, "membership filter rejected read");
            return Ok(ReadOutcome::Blocked);
        }

        let storage_key = StorageKey::new(&cache, &key);

        // H2 — Read + freshness classify
        match self.kv.get(storage_key.as_str()).await {
            Ok(Some(bytes)) => {
                let entry = CachedEntry::decode(&bytes);
                let now = now_ms();
                if !entry.is_expired(now) {
                    self.bump_access(&storage_key, &entry, now).await;

                    if TtlPolicy::should_pre_refresh(&entry, &options, now) {
                        match options.pre_refresh_mode {
                            PreRefreshMode::Sync => {
                                if let Err(err) = self.kv.delete(storage_key.as_str()).await {
                                    warn!(key = %storage_key.as_str(), error = %err, "pre-refresh SYNC delete failed");
                                }
                                // fall through to H3/H4 below as a miss
                            }
                            PreRefreshMode::Async => {
                                debug!(cache = %cache, key = %key, "pre-refresh due, serving stale and scheduling ASYNC reload");
                                self.spawn_refresh(
                                    storage_key,
                                    cache,
                                    key,
                                    options,
                                    load_fn,
                                    type_tag,
                                )
                                .await;
                                return Ok(entry_outcome(entry));
                            }
                        }
                    } else {
                        return Ok(entry_outcome(entry));
                    }
                } else if let Err(err) = self.kv.delete(storage_key.as_str()).await {
                    warn!(key = %storage_key.as_str(), error = %err, "expired-entry cleanup delete failed");
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(key = %storage_key.as_str(), error = %err, "kv read failed, treating as miss");
            }
        }

        // H3 — Breakdown lock
        let mut local_guard: Option<LockHandle> = None;
        let mut lease_guard: Option<Lease> = None;

        if options.use_local_lock || options.use_distributed_lock {
            if options.use_local_lock {
                local_guard = Some(
                    Self::cancellable(self.local_locks.acquire(&cache, &key), &mut cancel).await?,
                );
            }

            if options.use_distributed_lock {
                let lock_key = options.distributed_lock_key(&storage_key);
                let acquired = match &self.lease {
                    Some(lease_mgr) => lease_mgr
                        .try_acquire(&lock_key, options.lease_ttl_s())
                        .await
                        .unwrap_or_else(|err| {
                            warn!(lock_key = %lock_key, error = %err, "distributed lease acquire failed, degrading");
                            None
                        }),
                    None => None,
                };

                if let Some(lease) = acquired { lease_guard = Some(lease) } else {
                    warn!(lock_key = %lock_key, "distributed lock not acquired, falling through unprotected");
                    local_guard = None;
                }
            }

            // Double-checked read under lock: a concurrent loader may have
            // already populated the entry.
            if let Ok(Some(bytes)) = self.kv.get(storage_key.as_str()).await {
                let entry = CachedEntry::decode(&bytes);
                if !entry.is_expired(now_ms()) {
                    self.release_locks(local_guard, lease_guard).await;
                    return Ok(entry_outcome(entry));
                }
            }
        }

        // H4 + H5 — Load and write back
        let outcome = Self::cancellable(
            self.load_and_store(&storage_key, &cache, &key, &options, load_fn.as_ref(), &type_tag),
            &mut cancel,
        )
        .await
        .and_then(std::convert::identity);

        self.release_locks(local_guard, lease_guard).await;
        outcome
    }

    async fn release_locks(&self, local_guard: Option<LockHandle>, lease_guard: Option<Lease>) {
        if let Some(lease) = lease_guard
            && let Some(mgr) = &self.lease {
                mgr.release(lease).await;
            }
        drop(local_guard);
    }

    async fn bump_access(&self, storage_key: &StorageKey, entry: &CachedEntry, now: i64) {
        let remaining = entry.remaining_ttl(now);
        let ttl_for_write = if remaining == i64::MAX { -1 } else { remaining };
        let bumped = entry.clone().bump_access();

        if let Err(err) = self
            .kv
            .set(storage_key.as_str(), &bumped.to_bytes(), ttl_for_write)
            .await
        {
            warn!(key = %storage_key.as_str(), error = %err, "access_count write-back failed");
        }
    }

    async fn spawn_refresh(
        self: &Arc<Self>,
        storage_key: StorageKey,
        cache: String,
        key: String,
        options: CacheOptions,
        load_fn: Arc<LoadFn>,
        type_tag: String,
    ) {
        let engine = self.clone();
        let dedup_key = storage_key.as_str().to_string();
        self.scheduler
            .schedule(dedup_key, async move {
                if let Err(err) = engine
                    .load_and_store(&storage_key, &cache, &key, &options, load_fn.as_ref(), &type_tag)
                    .await
                {
                    warn!(cache = %cache, key = %key, error = %err, "background pre-refresh failed");
                }
            })
            .await;
    }

    /// H4 (load with timeout) followed by H5 (jittered-TTL write-back).
    async fn load_and_store(
        &self,
        storage_key: &StorageKey,
        cache: &str,
        key: &str,
        options: &CacheOptions,
        load_fn: &LoadFn,
        type_tag: &str,
    ) -> Result<ReadOutcome, GuardError> {
        let load_result = if options.sync_load_timeout_s == 0 {
            load_fn().await
        } else {
            match timeout(Duration::from_secs(options.sync_load_timeout_s), load_fn()).await {
                Ok(result) => result,
                Err(_) => return Err(GuardError::LoadTimeout),
            }
        };

        let (payload, is_null) = match load_result {
            Ok(Some(bytes)) => (bytes, false),
            Ok(None) if options.cache_null_values => (Vec::new(), true),
            Ok(None) => return Ok(ReadOutcome::Empty),
            Err(err) => return Err(GuardError::LoadFnFailed(err)),
        };

        let ttl = TtlPolicy::final_ttl(options.base_ttl_s, options.randomize_ttl, options.variance);
        let bytes = CachedEntry::encode(&payload, type_tag, ttl, is_null);

        match self.kv.set(storage_key.as_str(), &bytes, ttl).await {
            Ok(()) => {
                if options.use_membership_filter {
                    self.filter.add(cache, key);
                }
            }
            Err(err) => {
                warn!(key = %storage_key.as_str(), error = %err, "write-back failed, serving loaded value anyway");
            }
        }

        Ok(if is_null {
            ReadOutcome::Null
        } else {
            ReadOutcome::Value(payload)
        })
    }

    /// Races `fut` against cancellation, if a signal was supplied.
    async fn cancellable<T, Fut>(
        fut: Fut,
        cancel: &mut Option<watch::Receiver<bool>>,
    ) -> Result<T, GuardError>
    where
        Fut: Future<Output = T>,
    {
        let Some(rx) = cancel else {
            return Ok(fut.await);
        };
        if *rx.borrow() {
            return Err(GuardError::Cancelled);
        }

        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return Ok(out),
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow() {
                        return Err(GuardError::Cancelled);
                    }
                }
            }
        }
    }
}

fn entry_outcome(entry: CachedEntry) -> ReadOutcome {
    if entry.is_null {
        ReadOutcome::Null
    } else {
        ReadOutcome::Value(entry.payload_bytes)
    }
}
