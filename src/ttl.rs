//! `TtlPolicy` (C2) — jittered TTL selection and pre-refresh classification.

use crate::entry::CachedEntry;
use crate::options::CacheOptions;
use rand::Rng;

/// Stateless: the jitter PRNG is thread-local (`rand::thread_rng()`), so
/// there is no shared-mutex bottleneck across concurrent writers.
pub struct TtlPolicy;

impl TtlPolicy {
    /// `base_ttl <= 0` → infinite, no jitter. `variance == 0` or
    /// `randomize == false` → `base_ttl` unchanged. Otherwise draw `r`
    /// uniform in `[-variance, +variance]` and return
    /// `max(1, round(base_ttl * (1 + r)))`.
    #[must_use]
    pub fn final_ttl(base_ttl: i64, randomize: bool, variance: f64) -> i64 {
        if base_ttl <= 0 {
            return -1;
        }
        if !randomize || variance == 0.0 {
            return base_ttl;
        }
        #[allow(clippy::cast_precision_loss)]
        let base = base_ttl as f64;
        let r = rand::thread_rng().gen_range(-variance..=variance);
        let jittered = (base * (1.0 + r)).round();
        #[allow(clippy::cast_possible_truncation)]
        let jittered = jittered as i64;
        jittered.max(1)
    }

    /// False if the entry never expires or pre-refresh is disabled. True iff
    /// remaining TTL has dropped to or below `threshold` of the original TTL
    /// and the entry has not yet expired (`remaining == 0` is the miss path,
    /// not pre-refresh).
    #[must_use]
    pub fn should_pre_refresh(entry: &CachedEntry, options: &CacheOptions, now_ms: i64) -> bool {
        if entry.original_ttl_s <= 0 || !options.enable_pre_refresh {
            return false;
        }
        let remaining_ms = entry.remaining_ttl_ms(now_ms);
        if remaining_ms <= 0 {
            return false;
        }
        #[allow(clippy::cast_precision_loss)]
        let threshold_ms = entry.original_ttl_s as f64 * 1000.0 * options.pre_refresh_threshold;
        #[allow(clippy::cast_precision_loss)]
        let remaining_ms = remaining_ms as f64;
        remaining_ms <= threshold_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::now_ms;
    use crate::options::PreRefreshMode;

    #[test]
    fn infinite_base_ttl_yields_infinite_final_ttl() {
        assert_eq!(TtlPolicy::final_ttl(0, true, 0.5), -1);
        assert_eq!(TtlPolicy::final_ttl(-1, true, 0.5), -1);
    }

    #[test]
    fn no_randomization_passes_base_ttl_through() {
        assert_eq!(TtlPolicy::final_ttl(300, false, 0.5), 300);
        assert_eq!(TtlPolicy::final_ttl(300, true, 0.0), 300);
    }

    #[test]
    fn jitter_stays_within_variance_bounds() {
        for _ in 0..200 {
            let ttl = TtlPolicy::final_ttl(300, true, 0.5);
            assert!((150..=450).contains(&ttl), "ttl {ttl} out of bounds");
        }
    }

    #[test]
    fn pre_refresh_never_fires_for_infinite_entries() {
        let entry = CachedEntry {
            payload_bytes: vec![],
            type_fingerprint: String::new(),
            created_at_ms: now_ms(),
            original_ttl_s: -1,
            access_count: 0,
            is_null: false,
        };
        let options = CacheOptions::default().with_pre_refresh(1.0, PreRefreshMode::Sync);
        assert!(!TtlPolicy::should_pre_refresh(&entry, &options, now_ms()));
    }

    #[test]
    fn pre_refresh_fires_below_threshold_but_not_at_exact_expiry() {
        let options = CacheOptions::default().with_pre_refresh(0.5, PreRefreshMode::Sync);
        let entry = CachedEntry {
            payload_bytes: vec![],
            type_fingerprint: String::new(),
            created_at_ms: now_ms() - 6_000,
            original_ttl_s: 10,
            access_count: 0,
            is_null: false,
        };
        assert!(TtlPolicy::should_pre_refresh(&entry, &options, now_ms()));

        let expired = CachedEntry {
            created_at_ms: now_ms() - 11_000,
            ..entry
        };
        assert!(!TtlPolicy::should_pre_refresh(&expired, &options, now_ms()));
    }

    #[test]
    fn threshold_of_one_fires_on_every_read_of_a_ttld_entry() {
        let options = CacheOptions::default().with_pre_refresh(1.0, PreRefreshMode::Sync);
        let entry = CachedEntry {
            payload_bytes: vec![],
            type_fingerprint: String::new(),
            created_at_ms: now_ms() - 1_000,
            original_ttl_s: 300,
            access_count: 0,
            is_null: false,
        };
        assert!(TtlPolicy::should_pre_refresh(&entry, &options, now_ms()));
    }
}
