//! Process-local cache layer.
//!
//! Fastest and smallest-TTL layer of the chain, lost on restart. No
//! cross-process coordination; a plain map behind a `parking_lot` lock is
//! enough at the entry counts this layer is sized for.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::api::{PatioId, PatioSunExposure};
use crate::cache::{CacheKey, LayerMetrics};

struct Entry {
    value: PatioSunExposure,
    inserted_at: Instant,
}

pub struct MemoryCache {
    entries: parking_lot::RwLock<HashMap<CacheKey, Entry>>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: parking_lot::RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<PatioSunExposure> {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(key) {
                if entry.inserted_at.elapsed() < self.ttl {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        // Entry exists but expired; drop it under the write lock.
        self.entries.write().remove(key);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, key: CacheKey, value: PatioSunExposure) {
        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            // Evict the oldest entry to stay within the size cap.
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| *k)
            {
                entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every entry for one patio, across all timestamps.
    pub fn invalidate_patio(&self, patio_id: PatioId) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| key.patio_id != patio_id);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn metrics(&self) -> LayerMetrics {
        LayerMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: 0,
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::{exposure_fixture, key_at};

    #[test]
    fn test_hit_and_miss_counters() {
        let cache = MemoryCache::new(Duration::from_secs(60), 10);
        let key = key_at(1, 2024, 6, 21, 12, 0);

        assert!(cache.get(&key).is_none());
        cache.insert(key, exposure_fixture(1, 2024, 6, 21, 12, 0));
        assert!(cache.get(&key).is_some());

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.entries, 1);
    }

    #[test]
    fn test_ttl_expiry_counts_as_miss() {
        let cache = MemoryCache::new(Duration::from_millis(0), 10);
        let key = key_at(1, 2024, 6, 21, 12, 0);
        cache.insert(key, exposure_fixture(1, 2024, 6, 21, 12, 0));

        assert!(cache.get(&key).is_none());
        assert_eq!(cache.metrics().evictions, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_size_cap_evicts_oldest() {
        let cache = MemoryCache::new(Duration::from_secs(60), 2);
        cache.insert(key_at(1, 2024, 6, 21, 12, 0), exposure_fixture(1, 2024, 6, 21, 12, 0));
        std::thread::sleep(Duration::from_millis(5));
        cache.insert(key_at(2, 2024, 6, 21, 12, 0), exposure_fixture(2, 2024, 6, 21, 12, 0));
        std::thread::sleep(Duration::from_millis(5));
        cache.insert(key_at(3, 2024, 6, 21, 12, 0), exposure_fixture(3, 2024, 6, 21, 12, 0));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key_at(1, 2024, 6, 21, 12, 0)).is_none());
        assert!(cache.get(&key_at(3, 2024, 6, 21, 12, 0)).is_some());
    }

    #[test]
    fn test_invalidate_patio_scopes_to_one_patio() {
        let cache = MemoryCache::new(Duration::from_secs(60), 10);
        cache.insert(key_at(1, 2024, 6, 21, 12, 0), exposure_fixture(1, 2024, 6, 21, 12, 0));
        cache.insert(key_at(1, 2024, 6, 21, 13, 0), exposure_fixture(1, 2024, 6, 21, 13, 0));
        cache.insert(key_at(2, 2024, 6, 21, 12, 0), exposure_fixture(2, 2024, 6, 21, 12, 0));

        assert_eq!(cache.invalidate_patio(PatioId::new(1)), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key_at(2, 2024, 6, 21, 12, 0)).is_some());
    }
}
