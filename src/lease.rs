//! `DistributedLease` (C5) — cross-process breakdown defense.
//!
//! Issues raw commands via `redis::cmd(...)`: `SET NX PX` to acquire, a
//! compare-and-delete `EVAL` to release. The release script is the standard
//! Redis recipe for safe unlock: only delete the key if it still holds the
//! token we set, so a lease that outlived its owner (expired then reacquired
//! by someone else) is never yanked out from under the new owner.
use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use tracing::warn;
use uuid::Uuid;

const RELEASE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
";

/// A lease held on `lock_key`, identified by a random owner token so only
/// the acquirer (or a script that checks the token) can release it.
pub struct Lease {
    lock_key: String,
    owner_token: String,
}

/// Cross-process mutual exclusion backed by `SET key token NX PX ttl`.
pub struct DistributedLease {
    conn_manager: ConnectionManager,
}

impl DistributedLease {
    #[must_use]
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    /// Attempts to acquire `lock_key` for `ttl_s` seconds. `Ok(None)` means
    /// someone else currently holds it; this is the expected miss path, not
    /// an error.
    pub async fn try_acquire(&self, lock_key: &str, ttl_s: u64) -> Result<Option<Lease>> {
        let owner_token = Uuid::new_v4().to_string();
        let mut conn = self.conn_manager.clone();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(lock_key)
            .arg(&owner_token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_s.saturating_mul(1000))
            .query_async(&mut conn)
            .await
            .context("SET NX PX failed while acquiring distributed lease")?;

        Ok(acquired.map(|_| Lease {
            lock_key: lock_key.to_string(),
            owner_token,
        }))
    }

    /// Releases `lease` if it is still the current holder. A lease that has
    /// already expired server-side releases as a no-op; this is logged, not
    /// propagated, since the caller's critical section has already finished.
    pub async fn release(&self, lease: Lease) {
        let mut conn = self.conn_manager.clone();
        let result: Result<i64, redis::RedisError> = redis::Script::new(RELEASE_SCRIPT)
            .key(&lease.lock_key)
            .arg(&lease.owner_token)
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(1) => {}
            Ok(_) => warn!(lock_key = %lease.lock_key, "lease already expired before release"),
            Err(err) => warn!(lock_key = %lease.lock_key, error = %err, "failed to release distributed lease"),
        }
    }
}
