// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Stale-while-revalidate cache.
//!
//! Every entry carries an absolute TTL and a "stale" threshold inside it
//! (`ttl * stale_fraction`, 0.8 by default). Readers get the value plus a
//! staleness flag and decide for themselves whether to refresh in the
//! background. Nothing here ever blocks on a refresh.
//!
//! # Entry lifecycle
//!
//! ```text
//!  set()          0.8 * ttl              ttl
//!    │── fresh ──────│──── stale ─────────│── expired (removed on next read)
//! ```
//!
//! There is no capacity bound and no background sweep. Entries leave only
//! through expiry-on-read, `delete` or `clear`, so a cache should only front
//! key spaces of bounded cardinality.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::clock::SharedClock;

/// Fixed fraction of the TTL after which an entry reads as stale
pub const DEFAULT_STALE_FRACTION: f64 = 0.8;

#[derive(Clone, Debug)]
struct CacheEntry<T> {
    value: T,
    written_at: Instant,
    ttl: Duration,
}

/// What a plain `get` returns: the value (if any) and whether it is stale.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    pub value: Option<T>,
    pub is_stale: bool,
}

impl<T> CacheRead<T> {
    fn miss() -> Self {
        Self {
            value: None,
            is_stale: false,
        }
    }
}

/// Detailed lookup result.
///
/// `Expired` hands the dead value back exactly once (the entry is removed in
/// the same call) so a caller can keep it as a last-known fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Fresh(T),
    Stale(T),
    Expired(T),
    Miss,
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct SmartCacheStats {
    pub hits: u64,
    /// Hits that were past the stale threshold (subset of `hits`)
    pub stale_hits: u64,
    pub misses: u64,
    /// Entries dropped because they were read after expiry
    pub expirations: u64,
    pub entry_count: usize,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

/// One named cache region.
pub struct SmartCache<T> {
    name: String,
    entries: DashMap<String, CacheEntry<T>>,
    stale_fraction: f64,
    clock: SharedClock,
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl<T: Clone> SmartCache<T> {
    pub fn new(name: impl Into<String>, clock: SharedClock) -> Self {
        Self::with_stale_fraction(name, DEFAULT_STALE_FRACTION, clock)
    }

    pub fn with_stale_fraction(name: impl Into<String>, stale_fraction: f64, clock: SharedClock) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            stale_fraction: stale_fraction.clamp(0.0, 1.0),
            clock,
            hits: AtomicU64::new(0),
            stale_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// A zero TTL would be expired on arrival, so it is ignored.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let key = key.into();
        if ttl.is_zero() {
            warn!(region = %self.name, key = %key, "Ignoring cache write with zero TTL");
            return;
        }
        let entry = CacheEntry {
            value,
            written_at: self.clock.now(),
            ttl,
        };
        self.entries.insert(key, entry);
        crate::metrics::set_cache_entries(&self.name, self.entries.len());
    }

    /// Value plus staleness. Expired and absent keys look the same.
    pub fn get(&self, key: &str) -> CacheRead<T> {
        match self.lookup(key) {
            CacheLookup::Fresh(value) => CacheRead {
                value: Some(value),
                is_stale: false,
            },
            CacheLookup::Stale(value) => CacheRead {
                value: Some(value),
                is_stale: true,
            },
            CacheLookup::Expired(_) | CacheLookup::Miss => CacheRead::miss(),
        }
    }

    /// Classify `key` against the clock, removing it if expired.
    pub fn lookup(&self, key: &str) -> CacheLookup<T> {
        let now = self.clock.now();

        let (value, written_at, age, ttl) = match self.entries.get(key) {
            Some(entry) => (
                entry.value.clone(),
                entry.written_at,
                now.saturating_duration_since(entry.written_at),
                entry.ttl,
            ),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_lookup(&self.name, "miss");
                return CacheLookup::Miss;
            }
        };

        if age >= ttl {
            // Only remove the entry we looked at, not a concurrent rewrite.
            let removed = self
                .entries
                .remove_if(key, |_, e| e.written_at == written_at)
                .is_some();
            if removed {
                self.expirations.fetch_add(1, Ordering::Relaxed);
                crate::metrics::set_cache_entries(&self.name, self.entries.len());
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_cache_lookup(&self.name, "expired");
            debug!(region = %self.name, key = %key, "Cache entry expired");
            return CacheLookup::Expired(value);
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        if age >= ttl.mul_f64(self.stale_fraction) {
            self.stale_hits.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_cache_lookup(&self.name, "stale");
            CacheLookup::Stale(value)
        } else {
            crate::metrics::record_cache_lookup(&self.name, "fresh");
            CacheLookup::Fresh(value)
        }
    }
}

impl<T> SmartCache<T> {
    /// Remove a single key. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        crate::metrics::set_cache_entries(&self.name, self.entries.len());
        removed
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.entries.clear();
        crate::metrics::set_cache_entries(&self.name, 0);
    }

    /// Stored entries, including expired ones not yet read
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> SmartCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        SmartCacheStats {
            hits,
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            misses,
            expirations: self.expirations.load(Ordering::Relaxed),
            entry_count: self.entries.len(),
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use std::sync::Arc;

    fn cache() -> (SmartCache<Vec<&'static str>>, MockClock) {
        let clock = MockClock::default();
        (SmartCache::new("events", Arc::new(clock.clone())), clock)
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_missing_key() {
        let (cache, _clock) = cache();

        assert_eq!(cache.get("nope"), CacheRead { value: None, is_stale: false });
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_fresh_then_stale_then_gone() {
        let (cache, clock) = cache();
        cache.set("events:all", vec!["a", "b"], secs(10));

        clock.advance(secs(7));
        let read = cache.get("events:all");
        assert_eq!(read.value, Some(vec!["a", "b"]));
        assert!(!read.is_stale);

        clock.advance(secs(2));
        let read = cache.get("events:all");
        assert_eq!(read.value, Some(vec!["a", "b"]));
        assert!(read.is_stale);

        clock.advance(secs(2));
        assert_eq!(cache.get("events:all"), CacheRead { value: None, is_stale: false });
        assert!(cache.is_empty(), "expired entry is removed on read");
        // Second read of an expired key is still a plain miss
        assert_eq!(cache.get("events:all"), CacheRead { value: None, is_stale: false });
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let (cache, clock) = cache();
        cache.set("k", vec!["v"], secs(10));

        clock.advance(secs(8));
        assert!(cache.get("k").is_stale);

        clock.advance(secs(2));
        assert_eq!(cache.get("k").value, None);
    }

    #[test]
    fn test_lookup_returns_expired_value_once() {
        let (cache, clock) = cache();
        cache.set("k", vec!["old"], secs(1));
        clock.advance(secs(5));

        assert_eq!(cache.lookup("k"), CacheLookup::Expired(vec!["old"]));
        assert_eq!(cache.lookup("k"), CacheLookup::Miss);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_overwrite_resets_age() {
        let (cache, clock) = cache();
        cache.set("k", vec!["v1"], secs(10));
        clock.advance(secs(9));
        cache.set("k", vec!["v2"], secs(10));

        assert_eq!(cache.lookup("k"), CacheLookup::Fresh(vec!["v2"]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_ttl_is_ignored() {
        let (cache, _clock) = cache();
        cache.set("k", vec!["v"], Duration::ZERO);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_delete_and_clear() {
        let (cache, _clock) = cache();
        cache.set("a", vec!["1"], secs(10));
        cache.set("b", vec!["2"], secs(10));

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_hit_rate() {
        let (cache, clock) = cache();
        cache.set("k", vec!["v"], secs(10));

        cache.get("k");
        clock.advance(secs(9));
        cache.get("k");
        cache.get("other");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.stale_hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn test_custom_stale_fraction() {
        let clock = MockClock::default();
        let cache = SmartCache::with_stale_fraction("x", 0.5, Arc::new(clock.clone()));
        cache.set("k", 1u32, secs(10));

        clock.advance(secs(5));
        assert_eq!(cache.lookup("k"), CacheLookup::Stale(1));
    }
}
