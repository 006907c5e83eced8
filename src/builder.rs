//! `EngineBuilder` — builder pattern for constructing a [`ProtectionEngine`].
//!
//! # Example
//!
//! ```rust,no_run
//! use cache_guard::EngineBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = EngineBuilder::new().build().await?;
//!     Ok(())
//! }
//! ```

use crate::invocation::InvocationRegistry;
use crate::kv_store::{KvStore, RedisStore};
use crate::lease::DistributedLease;
use crate::local_lock::LocalLockRegistry;
use crate::membership::MembershipFilter;
use crate::refresh::RefreshScheduler;
use crate::ProtectionEngine;
use anyhow::Result;
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::Arc;
use tracing::info;

const DEFAULT_REFRESH_CONCURRENCY: usize = 4;

/// Builds a [`ProtectionEngine`] from a `KvStore` (custom or the default
/// Redis-backed one) plus the optional membership filter, distributed lease,
/// and refresh pool sizing.
pub struct EngineBuilder {
    kv: Option<Arc<dyn KvStore>>,
    redis_url: Option<String>,
    membership_filter: Option<MembershipFilter>,
    enable_distributed_lease: bool,
    refresh_concurrency: usize,
}

impl EngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            kv: None,
            redis_url: None,
            membership_filter: None,
            enable_distributed_lease: false,
            refresh_concurrency: DEFAULT_REFRESH_CONCURRENCY,
        }
    }

    /// Supplies a custom `KvStore`, e.g. to swap Redis for another backend
    /// with compare-and-set-with-TTL and scan-by-prefix support.
    #[must_use]
    pub fn with_kv_store(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Overrides the Redis URL used by the default `RedisStore`. Ignored if
    /// `with_kv_store` was also called.
    #[must_use]
    pub fn with_redis_url(mut self, redis_url: impl Into<String>) -> Self {
        self.redis_url = Some(redis_url.into());
        self
    }

    #[must_use]
    pub fn with_membership_filter(mut self, filter: MembershipFilter) -> Self {
        self.membership_filter = Some(filter);
        self
    }

    /// Enables the distributed lease path (C5), backed by its own Redis
    /// `ConnectionManager` connected to the same URL as the `KvStore`.
    /// Only takes effect when the default Redis `KvStore` is used, since a
    /// custom `KvStore` has no Redis connection to share.
    #[must_use]
    pub fn with_distributed_lease(mut self, enabled: bool) -> Self {
        self.enable_distributed_lease = enabled;
        self
    }

    #[must_use]
    pub fn with_refresh_concurrency(mut self, concurrency: usize) -> Self {
        self.refresh_concurrency = concurrency.max(1);
        self
    }

    pub async fn build(self) -> Result<Arc<ProtectionEngine>> {
        let redis_url = self
            .redis_url
            .clone()
            .unwrap_or_else(|| std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()));

        let (kv, lease) = if let Some(kv) = self.kv {
            info!("using custom KvStore, distributed lease unavailable without a Redis connection");
            (kv, None)
        } else {
            info!(redis_url = %redis_url, "connecting default RedisStore");
            let kv: Arc<dyn KvStore> = Arc::new(RedisStore::with_url(&redis_url).await?);
            let lease = if self.enable_distributed_lease {
                let client = Client::open(redis_url.as_str())?;
                let conn_manager = ConnectionManager::new(client).await?;
                Some(DistributedLease::new(conn_manager))
            } else {
                None
            };
            (kv, lease)
        };

        info!("cache-guard engine built");

        Ok(ProtectionEngine::new(
            kv,
            self.membership_filter.unwrap_or_default(),
            Arc::new(LocalLockRegistry::new()),
            lease,
            Arc::new(RefreshScheduler::new(self.refresh_concurrency)),
            InvocationRegistry::new(),
        ))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
