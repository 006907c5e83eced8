//! `MembershipFilter` (C3) — per-cache Bloom filter for penetration defense.
//!
//! Zero false negatives by construction (bit-vector membership test);
//! false positives are accepted and only weaken the defense, never
//! correctness. Lazily creates one filter per cache name on first
//! `add`/`might_contain`.

use bloomfilter::Bloom;
use dashmap::DashMap;
use parking_lot::Mutex;

const DEFAULT_EXPECTED_ITEMS: usize = 100_000;
const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

pub struct MembershipFilter {
    filters: DashMap<String, Mutex<Bloom<str>>>,
    expected_items: usize,
    false_positive_rate: f64,
}

impl Default for MembershipFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXPECTED_ITEMS, DEFAULT_FALSE_POSITIVE_RATE)
    }
}

impl MembershipFilter {
    #[must_use]
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        Self {
            filters: DashMap::new(),
            expected_items,
            false_positive_rate,
        }
    }

    fn new_bloom(&self) -> Bloom<str> {
        Bloom::new_for_fp_rate(self.expected_items.max(1), self.false_positive_rate)
    }

    /// Returns `false` only if `key_str` has definitely never been `add`ed
    /// to `cache`'s filter.
    #[must_use]
    pub fn might_contain(&self, cache: &str, key_str: &str) -> bool {
        match self.filters.get(cache) {
            Some(filter) => filter.lock().check(key_str),
            None => false,
        }
    }

    pub fn add(&self, cache: &str, key_str: &str) {
        let filter = self
            .filters
            .entry(cache.to_string())
            .or_insert_with(|| Mutex::new(self.new_bloom()));
        filter.lock().set(key_str);
    }

    /// Resets the filter for `cache` (paired with clearing the KV namespace
    /// by the caller). Evicting other caches is unaffected.
    pub fn clear(&self, cache: &str) {
        self.filters.remove(cache);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_added_key_might_contain_is_false() {
        let filter = MembershipFilter::default();
        assert!(!filter.might_contain("users", "42"));
    }

    #[test]
    fn added_key_never_produces_a_false_negative() {
        let filter = MembershipFilter::new(1000, 0.01);
        for i in 0..500 {
            filter.add("users", &i.to_string());
        }
        for i in 0..500 {
            assert!(filter.might_contain("users", &i.to_string()));
        }
    }

    #[test]
    fn clear_resets_only_the_named_cache() {
        let filter = MembershipFilter::default();
        filter.add("users", "42");
        filter.add("products", "7");
        filter.clear("users");
        assert!(!filter.might_contain("users", "42"));
        assert!(filter.might_contain("products", "7"));
    }
}
