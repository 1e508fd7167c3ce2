//! Bounded, time-limited cache of ranked search results.
//!
//! Keys are normalized query strings; values are the ranked record
//! identifiers the query produced. Entries are dropped when:
//!
//! - they are older than the configured max age (checked on read)
//! - the cache is over capacity (oldest insertion goes first)
//! - the mirror changes (the controller calls [`ResultCache::clear`])
//!
//! Reads use `LruCache::peek`, which leaves recency untouched, so eviction
//! order is insertion order rather than access order.

use crate::types::RecordId;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default number of cached queries
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default entry lifetime (24 hours)
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Ranked identifiers cached for one query.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub ids: Arc<[RecordId]>,
    pub created: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, max_age: Duration) -> bool {
        self.created.elapsed() < max_age
    }
}

/// Cache hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub expirations: AtomicU64,
}

impl CacheStats {
    /// Hit ratio in `0.0..=1.0`; zero before any lookup
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Query → ranked identifiers.
pub struct ResultCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    max_age: Duration,
    stats: CacheStats,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_MAX_AGE)
    }
}

impl ResultCache {
    /// Create a cache holding at most `capacity` queries for at most `max_age`.
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        ResultCache {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            max_age,
            stats: CacheStats::default(),
        }
    }

    /// Cached identifiers for `query`, if present and not expired.
    ///
    /// An expired entry is removed and counted as a miss.
    pub fn get(&self, query: &str) -> Option<Arc<[RecordId]>> {
        let mut entries = self.entries.lock();

        let found = entries
            .peek(query)
            .map(|entry| (entry.is_fresh(self.max_age), Arc::clone(&entry.ids)));

        let fresh = match found {
            Some((true, ids)) => Some(ids),
            Some((false, _)) => {
                entries.pop(query);
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
                debug!(query = %query, "Dropped expired cache entry");
                None
            }
            None => None,
        };

        if fresh.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        fresh
    }

    /// Insert or overwrite the entry for `query`.
    ///
    /// Empty queries are never cached.
    pub fn set(&self, query: &str, ids: Vec<RecordId>) {
        if query.is_empty() {
            return;
        }

        let entry = CacheEntry {
            ids: ids.into(),
            created: Instant::now(),
        };

        let mut entries = self.entries.lock();
        // Overwrite first so the key moves to the newest position
        if entries.pop(query).is_none() && entries.len() == entries.cap().get() {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        entries.put(query.to_string(), entry);
    }

    /// Drop the entry for `query`, if any.
    pub fn remove(&self, query: &str) {
        self.entries.lock().pop(query);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        if !entries.is_empty() {
            debug!(entries = entries.len(), "Clearing result cache");
        }
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("len", &self.len())
            .field("max_age", &self.max_age)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<RecordId> {
        list.iter().map(|s| RecordId::new(*s)).collect()
    }

    #[test]
    fn test_get_after_set() {
        let cache = ResultCache::default();
        cache.set("abc", ids(&["r2", "r1"]));

        let hit = cache.get("abc").unwrap();
        assert_eq!(&*hit, ids(&["r2", "r1"]).as_slice());
        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_miss() {
        let cache = ResultCache::default();
        assert!(cache.get("abc").is_none());
        assert_eq!(cache.stats().misses.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().hit_rate(), 0.0);
    }

    #[test]
    fn test_empty_query_not_cached() {
        let cache = ResultCache::default();
        cache.set("", ids(&["r1"]));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = ResultCache::default();
        cache.set("a", ids(&["r1"]));
        cache.set("b", ids(&["r2"]));
        cache.clear();

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evicts_oldest_insertion() {
        let cache = ResultCache::new(2, DEFAULT_MAX_AGE);
        cache.set("a", ids(&["r1"]));
        cache.set("b", ids(&["r2"]));

        // Reading "a" must not protect it from eviction
        assert!(cache.get("a").is_some());
        cache.set("c", ids(&["r3"]));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_overwrite_refreshes_position() {
        let cache = ResultCache::new(2, DEFAULT_MAX_AGE);
        cache.set("a", ids(&["r1"]));
        cache.set("b", ids(&["r2"]));
        cache.set("a", ids(&["r9"]));
        cache.set("c", ids(&["r3"]));

        assert!(cache.get("b").is_none());
        assert_eq!(&*cache.get("a").unwrap(), ids(&["r9"]).as_slice());
        assert_eq!(cache.stats().evictions.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let cache = ResultCache::new(10, Duration::ZERO);
        cache.set("abc", ids(&["r1"]));

        assert!(cache.get("abc").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let cache = ResultCache::new(0, DEFAULT_MAX_AGE);
        assert_eq!(cache.capacity(), 1);
    }
}
