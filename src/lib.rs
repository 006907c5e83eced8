//! cache-guard
//!
//! A declarative cache-protection layer in front of Redis. Application code
//! hands the engine a `ReadRequest` (cache name, key, per-read options, and a
//! `load_fn` closure that re-runs the origin lookup on a miss); the engine
//! decides whether to serve from cache, block the read outright, load under a
//! single-flight lock, or serve stale while refreshing in the background.
//!
//! Four protections compose through [`CacheOptions`] flags rather than
//! swappable handler implementations:
//! - **Penetration** — [`MembershipFilter`] rejects reads for keys that were
//!   never written.
//! - **Breakdown** — [`LocalLockRegistry`] (always) and [`DistributedLease`]
//!   (optionally, cluster-wide) serialize concurrent loads of the same key.
//! - **Avalanche** — [`TtlPolicy`] jitters TTLs on write so correlated entries
//!   don't expire together.
//! - **Pre-refresh** — entries nearing expiry trigger either an eager
//!   synchronous reload or a background [`RefreshScheduler`] task.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use cache_guard::{CacheOptions, EngineBuilder, ReadRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = EngineBuilder::new().build().await?;
//!
//!     let load_fn = Arc::new(|| {
//!         Box::pin(async { Ok(Some(b"David".to_vec())) })
//!             as std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<Option<Vec<u8>>>> + Send>>
//!     });
//!
//!     let request = ReadRequest::new("users", "1", load_fn)
//!         .with_options(CacheOptions::default().with_base_ttl(300));
//!     let outcome = engine.get(request).await?;
//!     println!("{outcome:?}");
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod engine;
pub mod entry;
pub mod error;
pub mod invocation;
pub mod kv_store;
pub mod lease;
pub mod local_lock;
pub mod membership;
pub mod options;
pub mod refresh;
pub mod ttl;

pub use builder::EngineBuilder;
pub use engine::{LoadFn, LoadFuture, ProtectionEngine, ReadOutcome, ReadRequest};
pub use entry::CachedEntry;
pub use error::GuardError;
pub use invocation::{InvocationRecord, InvocationRegistry};
pub use kv_store::mock::MockStore;
pub use kv_store::{KvStore, RedisStore};
pub use lease::{DistributedLease, Lease};
pub use local_lock::{LocalLockRegistry, LockHandle};
pub use membership::MembershipFilter;
pub use options::{CacheOptions, PreRefreshMode, StorageKey};
pub use refresh::RefreshScheduler;
pub use ttl::TtlPolicy;

// Re-exported for users implementing a custom `KvStore`.
pub use async_trait::async_trait;
