//! In-memory report cache
//!
//! Keyed by the scan's content hash, so two requests for the same text
//! share an entry no matter what name they were submitted under.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::core::scanner::ScanReport;
use crate::utils::constants::DEFAULT_CACHE_TTL_SECS;

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub report: ScanReport,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }

    pub fn remaining_ttl(&self) -> u64 {
        self.ttl.saturating_sub(self.created_at.elapsed()).as_secs()
    }
}

/// Thread-safe TTL cache of scan reports
#[derive(Clone)]
pub struct ReportCache {
    store: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl Default for ReportCache {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }
}

impl ReportCache {
    /// A zero TTL disables caching
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            ttl,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    #[inline]
    fn normalize_key(key: &str) -> String {
        key.to_lowercase()
    }

    pub fn get(&self, key: &str) -> Option<ScanReport> {
        if !self.is_enabled() {
            return None;
        }
        let key = Self::normalize_key(key);

        if let Some(entry) = self.store.get(&key) {
            if entry.is_expired() {
                drop(entry); // release the shard lock before removing
                self.store.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("📭 CACHE MISS (expired): {}", key);
                None
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("✅ CACHE HIT: {} (TTL: {}s remaining)", key, entry.remaining_ttl());
                Some(entry.report.clone())
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("📭 CACHE MISS: {}", key);
            None
        }
    }

    pub fn set(&self, key: &str, report: ScanReport) {
        if !self.is_enabled() {
            return;
        }
        let key = Self::normalize_key(key);
        self.store.insert(
            key.clone(),
            CacheEntry {
                report,
                created_at: Instant::now(),
                ttl: self.ttl,
            },
        );
        debug!("💾 CACHE SET: {} (TTL: {}s)", key, self.ttl.as_secs());
    }

    pub fn invalidate(&self, key: &str) {
        self.store.remove(&Self::normalize_key(key));
    }

    /// Drop expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.store.len());
        if removed > 0 {
            info!("🧹 CACHE CLEANUP: {} expired entries removed", removed);
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.store.len(),
            hits,
            misses,
            hit_rate,
            ttl_secs: self.ttl.as_secs(),
        }
    }

    pub fn clear(&self) {
        self.store.clear();
        info!("🗑️ CACHE CLEARED");
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::TaxScanner;
    use crate::models::config::ScannerConfig;

    fn report() -> ScanReport {
        let scanner = TaxScanner::from_config(ScannerConfig {
            cache_ttl: Duration::ZERO,
            ..ScannerConfig::builtin()
        })
        .unwrap();
        scanner
            .scan_source("t.sol", "contract T { function transfer(address to, uint256 a) public {} }")
            .unwrap()
    }

    #[test]
    fn test_cache_set_get() {
        let cache = ReportCache::default();
        let report = report();
        cache.set(&report.source_hash, report.clone());
        let hit = cache.get(&report.source_hash).unwrap();
        assert_eq!(hit.id, report.id);
    }

    #[test]
    fn test_key_normalization() {
        let cache = ReportCache::default();
        cache.set("0xABCDEF", report());
        assert!(cache.get("0xabcdef").is_some());
    }

    #[test]
    fn test_cache_stats() {
        let cache = ReportCache::default();
        cache.set("0x01", report());
        cache.get("0x01");
        cache.get("0x02");

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 50.0);
    }

    #[test]
    fn test_expired_entries() {
        let cache = ReportCache::with_ttl(Duration::from_millis(1));
        cache.set("0x01", report());
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.get("0x01").is_none());
    }

    #[test]
    fn test_zero_ttl_disables() {
        let cache = ReportCache::with_ttl(Duration::ZERO);
        cache.set("0x01", report());
        assert!(cache.get("0x01").is_none());
        assert_eq!(cache.stats().entries, 0);
    }
}
