//! Per-read cache configuration and the storage-key format.

/// `cache_name + "::" + key`. The separator is contractual: scan and clear
/// rely on `cache_name + "::*"`, so cache names must not themselves contain
/// `::`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    #[must_use]
    pub fn new(cache: &str, key: &str) -> Self {
        debug_assert!(
            !cache.contains("::"),
            "cache name must not contain the '::' separator"
        );
        Self(format!("{cache}::{key}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn scan_prefix(cache: &str) -> String {
        format!("{cache}::*")
    }
}

/// `SYNC` forces an immediate reload on the triggering caller; `ASYNC` serves
/// the stale value and dispatches a background refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreRefreshMode {
    Sync,
    Async,
}

/// Per-read, per-key configuration (§3 `CacheOptions`).
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// `>0` or `-1` for infinite.
    pub base_ttl_s: i64,
    pub randomize_ttl: bool,
    /// In `[0.0, 1.0]`.
    pub variance: f64,
    pub cache_null_values: bool,
    pub use_membership_filter: bool,
    pub use_local_lock: bool,
    pub use_distributed_lock: bool,
    /// Defaults to `"cache:lock:" + storage_key` when `None`.
    pub distributed_lock_key: Option<String>,
    pub enable_pre_refresh: bool,
    /// In `(0.0, 1.0]`.
    pub pre_refresh_threshold: f64,
    pub pre_refresh_mode: PreRefreshMode,
    pub sync_load_timeout_s: u64,
    pub custom_strategy_tag: Option<String>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            base_ttl_s: 300,
            randomize_ttl: false,
            variance: 0.0,
            cache_null_values: false,
            use_membership_filter: true,
            use_local_lock: true,
            use_distributed_lock: false,
            distributed_lock_key: None,
            enable_pre_refresh: false,
            pre_refresh_threshold: 0.3,
            pre_refresh_mode: PreRefreshMode::Sync,
            sync_load_timeout_s: 10,
            custom_strategy_tag: None,
        }
    }
}

impl CacheOptions {
    #[must_use]
    pub fn with_base_ttl(mut self, ttl_s: i64) -> Self {
        self.base_ttl_s = ttl_s;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, variance: f64) -> Self {
        self.randomize_ttl = true;
        self.variance = variance;
        self
    }

    #[must_use]
    pub fn with_cache_null_values(mut self, cache_null_values: bool) -> Self {
        self.cache_null_values = cache_null_values;
        self
    }

    #[must_use]
    pub fn with_membership_filter(mut self, enabled: bool) -> Self {
        self.use_membership_filter = enabled;
        self
    }

    #[must_use]
    pub fn with_local_lock(mut self, enabled: bool) -> Self {
        self.use_local_lock = enabled;
        self
    }

    #[must_use]
    pub fn with_distributed_lock(mut self, enabled: bool) -> Self {
        self.use_distributed_lock = enabled;
        self
    }

    #[must_use]
    pub fn with_pre_refresh(mut self, threshold: f64, mode: PreRefreshMode) -> Self {
        self.enable_pre_refresh = true;
        self.pre_refresh_threshold = threshold;
        self.pre_refresh_mode = mode;
        self
    }

    #[must_use]
    pub fn with_sync_load_timeout(mut self, timeout_s: u64) -> Self {
        self.sync_load_timeout_s = timeout_s;
        self
    }

    /// Effective distributed-lock key per §4.3/§6.
    #[must_use]
    pub fn distributed_lock_key(&self, storage_key: &StorageKey) -> String {
        self.distributed_lock_key
            .clone()
            .unwrap_or_else(|| format!("cache:lock:{}", storage_key.as_str()))
    }

    /// §9: lease TTL is standardized on `max(5, min(30, sync_load_timeout_s))`.
    #[must_use]
    pub fn lease_ttl_s(&self) -> u64 {
        self.sync_load_timeout_s.clamp(5, 30)
    }
}
