//! Distributed cache layer.
//!
//! Shared across service instances with last-writer-wins writes and TTL
//! expiry. Values are derived and reproducible, so lost or clobbered
//! writes cost a recomputation, never correctness. The trait keeps the
//! chain testable and lets deployments plug in an external store; the
//! bundled implementation is a single-process stand-in with an
//! availability switch for exercising outage handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::api::{CoreError, CoreResult, PatioId, PatioSunExposure};
use crate::cache::CacheKey;

#[async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> CoreResult<Option<PatioSunExposure>>;

    async fn put(&self, key: CacheKey, value: PatioSunExposure, ttl: Duration) -> CoreResult<()>;

    /// Remove every entry for one patio. Returns the number removed.
    async fn invalidate_patio(&self, patio_id: PatioId) -> CoreResult<usize>;

    async fn entry_count(&self) -> CoreResult<usize>;
}

struct StoredEntry {
    value: PatioSunExposure,
    expires_at: DateTime<Utc>,
}

/// In-process stand-in for a shared cache deployment.
#[derive(Default)]
pub struct LocalDistributedCache {
    entries: parking_lot::RwLock<HashMap<CacheKey, StoredEntry>>,
    available: AtomicBool,
}

impl LocalDistributedCache {
    pub fn new() -> Self {
        Self {
            entries: parking_lot::RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage of the shared store.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> CoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::ExternalDependencyDegraded(
                "distributed cache unavailable".into(),
            ))
        }
    }
}

#[async_trait]
impl DistributedCache for LocalDistributedCache {
    async fn get(&self, key: &CacheKey) -> CoreResult<Option<PatioSunExposure>> {
        self.check_available()?;
        let now = Utc::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        self.entries.write().remove(key);
        Ok(None)
    }

    async fn put(&self, key: CacheKey, value: PatioSunExposure, ttl: Duration) -> CoreResult<()> {
        self.check_available()?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 2));
        self.entries
            .write()
            .insert(key, StoredEntry { value, expires_at });
        Ok(())
    }

    async fn invalidate_patio(&self, patio_id: PatioId) -> CoreResult<usize> {
        self.check_available()?;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| key.patio_id != patio_id);
        Ok(before - entries.len())
    }

    async fn entry_count(&self) -> CoreResult<usize> {
        self.check_available()?;
        Ok(self.entries.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::{exposure_fixture, key_at};

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let cache = LocalDistributedCache::new();
        let key = key_at(1, 2024, 6, 21, 12, 0);
        cache
            .put(key, exposure_fixture(1, 2024, 6, 21, 12, 0), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.get(&key).await.unwrap().is_some());
        assert_eq!(cache.entry_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = LocalDistributedCache::new();
        let key = key_at(1, 2024, 6, 21, 12, 0);
        cache
            .put(key, exposure_fixture(1, 2024, 6, 21, 12, 0), Duration::from_secs(0))
            .await
            .unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());
        assert_eq!(cache.entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors_as_degraded() {
        let cache = LocalDistributedCache::new();
        cache.set_available(false);

        let key = key_at(1, 2024, 6, 21, 12, 0);
        let result = cache.get(&key).await;
        assert!(matches!(
            result,
            Err(CoreError::ExternalDependencyDegraded(_))
        ));
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let cache = LocalDistributedCache::new();
        let key = key_at(1, 2024, 6, 21, 12, 0);
        let mut first = exposure_fixture(1, 2024, 6, 21, 12, 0);
        first.sunlit_pct = 10.0;
        let mut second = exposure_fixture(1, 2024, 6, 21, 12, 0);
        second.sunlit_pct = 90.0;

        cache.put(key, first, Duration::from_secs(60)).await.unwrap();
        cache.put(key, second, Duration::from_secs(60)).await.unwrap();

        let stored = cache.get(&key).await.unwrap().unwrap();
        assert!((stored.sunlit_pct - 90.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_invalidate_patio() {
        let cache = LocalDistributedCache::new();
        cache
            .put(
                key_at(1, 2024, 6, 21, 12, 0),
                exposure_fixture(1, 2024, 6, 21, 12, 0),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        cache
            .put(
                key_at(2, 2024, 6, 21, 12, 0),
                exposure_fixture(2, 2024, 6, 21, 12, 0),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert_eq!(cache.invalidate_patio(PatioId::new(1)).await.unwrap(), 1);
        assert_eq!(cache.entry_count().await.unwrap(), 1);
    }
}
