//! `KvStore` (C7) — thin abstraction over the remote key/value store.
//!
//! `RedisStore` wraps a `ConnectionManager` for automatic reconnection, uses
//! a `SCAN ... MATCH ... COUNT 100` cursor loop for prefix scans, and runs a
//! `PING` health check on connect.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::debug;

/// Narrow KV interface the engine depends on. Any store with
/// compare-and-set-with-TTL and scan-by-prefix can be substituted.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, bytes: &[u8], ttl_s: i64) -> Result<()>;
    async fn set_if_absent(&self, key: &str, bytes: &[u8], ttl_s: i64) -> Result<bool>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn scan(&self, prefix: &str) -> Result<Vec<String>>;
    /// `-2` missing, `-1` no expiry, `>=0` seconds remaining.
    async fn ttl(&self, key: &str) -> Result<i64>;
    async fn expire(&self, key: &str, ttl_s: i64) -> Result<bool>;
}

/// Redis-backed [`KvStore`].
pub struct RedisStore {
    conn_manager: ConnectionManager,
}

impl RedisStore {
    /// Reads `REDIS_URL`, falling back to `redis://127.0.0.1:6379`.
    pub async fn new() -> Result<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        Self::with_url(&redis_url).await
    }

    pub async fn with_url(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .with_context(|| format!("failed to create Redis client for {redis_url}"))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .context("failed to establish Redis connection manager")?;

        let mut conn = conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING health check failed")?;

        Ok(Self { conn_manager })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    async fn set(&self, key: &str, bytes: &[u8], ttl_s: i64) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        if ttl_s < 0 {
            let _: () = conn.set(key, bytes).await?;
        } else {
            let ttl_s = ttl_s.max(1).unsigned_abs();
            let _: () = conn.set_ex(key, bytes, ttl_s).await?;
        }
        debug!(key = %key, ttl_s, "[Redis] wrote key");
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, bytes: &[u8], ttl_s: i64) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(bytes).arg("NX");
        if ttl_s >= 0 {
            cmd.arg("EX").arg(ttl_s.max(1));
        }
        let result: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(result.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.conn_manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(prefix)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            cursor = next_cursor;
            keys.extend(batch);

            if cursor == 0 {
                break;
            }
        }

        debug!(prefix = %prefix, count = keys.len(), "[Redis] scanned keys");
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn_manager.clone();
        let ttl: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        Ok(ttl)
    }

    async fn expire(&self, key: &str, ttl_s: i64) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let ok: bool = conn.expire(key, ttl_s.max(0)).await?;
        Ok(ok)
    }
}

/// In-memory [`KvStore`], used to unit-test and benchmark the engine without
/// a live Redis instance.
pub mod mock {
    use super::KvStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::{Duration, Instant};

    struct Slot {
        bytes: Vec<u8>,
        expires_at: Option<Instant>,
    }

    #[derive(Default)]
    pub struct MockStore {
        data: Mutex<HashMap<String, Slot>>,
    }

    impl MockStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn is_live(slot: &Slot) -> bool {
            slot.expires_at.is_none_or(|at| at > Instant::now())
        }
    }

    #[async_trait]
    impl KvStore for MockStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let data = self.data.lock();
            Ok(data
                .get(key)
                .filter(|slot| Self::is_live(slot))
                .map(|slot| slot.bytes.clone()))
        }

        async fn set(&self, key: &str, bytes: &[u8], ttl_s: i64) -> Result<()> {
            let expires_at = (ttl_s >= 0).then(|| Instant::now() + Duration::from_secs(ttl_s.max(0).unsigned_abs()));
            self.data.lock().insert(
                key.to_string(),
                Slot {
                    bytes: bytes.to_vec(),
                    expires_at,
                },
            );
            Ok(())
        }

        async fn set_if_absent(&self, key: &str, bytes: &[u8], ttl_s: i64) -> Result<bool> {
            let mut data = self.data.lock();
            let occupied = data.get(key).is_some_and(Self::is_live);
            if occupied {
                return Ok(false);
            }
            let expires_at = (ttl_s >= 0).then(|| Instant::now() + Duration::from_secs(ttl_s.max(0).unsigned_abs()));
            data.insert(
                key.to_string(),
                Slot {
                    bytes: bytes.to_vec(),
                    expires_at,
                },
            );
            Ok(true)
        }

        async fn delete(&self, key: &str) -> Result<bool> {
            Ok(self.data.lock().remove(key).is_some())
        }

        async fn scan(&self, prefix: &str) -> Result<Vec<String>> {
            let prefix = prefix.trim_end_matches('*');
            Ok(self
                .data
                .lock()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn ttl(&self, key: &str) -> Result<i64> {
            let data = self.data.lock();
            Ok(match data.get(key) {
                None => -2,
                Some(slot) if !Self::is_live(slot) => -2,
                Some(Slot {
                    expires_at: None, ..
                }) => -1,
                Some(Slot {
                    expires_at: Some(at),
                    ..
                }) => at
                    .saturating_duration_since(Instant::now())
                    .as_secs()
                    .try_into()
                    .unwrap_or(i64::MAX),
            })
        }

        async fn expire(&self, key: &str, ttl_s: i64) -> Result<bool> {
            let mut data = self.data.lock();
            match data.get_mut(key) {
                Some(slot) if Self::is_live(slot) => {
                    slot.expires_at = Some(Instant::now() + Duration::from_secs(ttl_s.max(0).unsigned_abs()));
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }
}
