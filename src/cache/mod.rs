// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-region stale-while-revalidate caches.
//!
//! Each region is an independent [`SmartCache`]. The caller picks the region,
//! so keys in different regions can never collide.
//!
//! Regions live in process memory only. Two instances behind a load
//! balancer each hold their own copy and may serve different values for the
//! same key until both expire.

pub mod smart_cache;

pub use smart_cache::{CacheLookup, CacheRead, SmartCache, SmartCacheStats, DEFAULT_STALE_FRACTION};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::SharedClock;

/// Region names used by the reference deployment
pub const DEFAULT_REGIONS: [&str; 4] = ["events", "analytics", "schedules", "registrations"];

/// Named set of cache regions.
pub struct CacheRegions<T> {
    regions: BTreeMap<String, Arc<SmartCache<T>>>,
}

impl<T: Clone> CacheRegions<T> {
    pub fn new<I, S>(names: I, stale_fraction: f64, clock: SharedClock) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let regions = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                let cache = SmartCache::with_stale_fraction(name.clone(), stale_fraction, clock.clone());
                (name, Arc::new(cache))
            })
            .collect();
        Self { regions }
    }

    #[must_use]
    pub fn region(&self, name: &str) -> Option<&Arc<SmartCache<T>>> {
        self.regions.get(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.regions.keys().map(String::as_str).collect()
    }

    /// Entry count per region, ordered by name
    #[must_use]
    pub fn entry_counts(&self) -> BTreeMap<String, usize> {
        self.regions
            .iter()
            .map(|(name, cache)| (name.clone(), cache.len()))
            .collect()
    }

    pub fn clear_all(&self) {
        for cache in self.regions.values() {
            cache.clear();
        }
    }
}
