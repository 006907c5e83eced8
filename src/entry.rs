//! `CachedEntry` envelope — the unit stored in the remote KV store.
//!
//! Wire format is a versioned, self-describing JSON envelope (§6):
//! `{ v, value, type, ttl, created, accesses, null }`. Decoding bytes that
//! don't match this shape produces a "legacy raw value" entry so that keys
//! written before this envelope existed keep reading correctly.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

const ENVELOPE_VERSION: u8 = 1;

/// The unit of data stored at a [`crate::StorageKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub payload_bytes: Vec<u8>,
    pub type_fingerprint: String,
    pub created_at_ms: i64,
    /// `-1` means infinite (never expires, never pre-refreshes).
    pub original_ttl_s: i64,
    pub access_count: u64,
    pub is_null: bool,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    v: u8,
    value: Vec<u8>,
    #[serde(rename = "type")]
    type_fingerprint: String,
    ttl: i64,
    created: i64,
    accesses: u64,
    null: bool,
}

/// Milliseconds since the Unix epoch, per the `created_at_ms` field contract.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

impl CachedEntry {
    /// Encode a value into the wire envelope. `ttl_s = -1` means infinite.
    #[must_use]
    pub fn encode(value_bytes: &[u8], type_tag: &str, ttl_s: i64, is_null: bool) -> Vec<u8> {
        let envelope = Envelope {
            v: ENVELOPE_VERSION,
            value: value_bytes.to_vec(),
            type_fingerprint: type_tag.to_string(),
            ttl: ttl_s,
            created: now_ms(),
            accesses: 0,
            null: is_null,
        };
        // A serde_json envelope can't fail to serialize here: every field is
        // a plain owned value with no custom Serialize impl that can error.
        serde_json::to_vec(&envelope).unwrap_or_default()
    }

    /// Decode bytes previously produced by [`CachedEntry::encode`], or bytes
    /// written by a version of this system that predates the envelope.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> CachedEntry {
        match serde_json::from_slice::<Envelope>(bytes) {
            Ok(env) if env.v == ENVELOPE_VERSION => CachedEntry {
                payload_bytes: env.value,
                type_fingerprint: env.type_fingerprint,
                created_at_ms: env.created,
                original_ttl_s: env.ttl,
                access_count: env.accesses,
                is_null: env.null,
            },
            _ => CachedEntry {
                payload_bytes: bytes.to_vec(),
                type_fingerprint: String::new(),
                created_at_ms: now_ms(),
                original_ttl_s: -1,
                access_count: 0,
                is_null: false,
            },
        }
    }

    /// Re-serialize this entry, e.g. after [`CachedEntry::bump_access`].
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let envelope = Envelope {
            v: ENVELOPE_VERSION,
            value: self.payload_bytes.clone(),
            type_fingerprint: self.type_fingerprint.clone(),
            ttl: self.original_ttl_s,
            created: self.created_at_ms,
            accesses: self.access_count,
            null: self.is_null,
        };
        serde_json::to_vec(&envelope).unwrap_or_default()
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        if self.original_ttl_s < 0 {
            return false;
        }
        self.remaining_ttl_ms(now_ms) <= 0
    }

    /// Milliseconds remaining until expiry; never negative. `-1` original
    /// TTL (infinite) is represented by `i64::MAX`. Pre-refresh classification
    /// needs this resolution: a whole-second `remaining_ttl` can't tell a
    /// freshly-written entry from one about to expire when `original_ttl_s`
    /// is itself small.
    #[must_use]
    pub fn remaining_ttl_ms(&self, now_ms: i64) -> i64 {
        if self.original_ttl_s < 0 {
            return i64::MAX;
        }
        let total_ms = self.original_ttl_s.saturating_mul(1000);
        let elapsed_ms = (now_ms - self.created_at_ms).max(0);
        (total_ms - elapsed_ms).max(0)
    }

    /// Seconds remaining until expiry, rounded up so a live entry is never
    /// reported as having zero TTL left. `-1` original TTL (infinite) is
    /// represented by `i64::MAX` so callers can compare freely.
    #[must_use]
    pub fn remaining_ttl(&self, now_ms: i64) -> i64 {
        if self.original_ttl_s < 0 {
            return i64::MAX;
        }
        (self.remaining_ttl_ms(now_ms) + 999) / 1000
    }

    #[must_use]
    pub fn bump_access(mut self) -> Self {
        self.access_count = self.access_count.saturating_add(1);
        self
    }
}
