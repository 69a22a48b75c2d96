//! Byte-budget bounded local cache with LRU eviction.
//!
//! # Design
//!
//! - One exclusive lock around the map and the recency list; every operation
//!   is amortized O(1)
//! - Entries are accounted as `len(key) + len(value)`
//! - Inserting past the budget evicts from the LRU end until the budget
//!   holds again; a single entry larger than the whole budget is still
//!   admitted after evicting everything before it

use lru::LruCache;
use parking_lot::Mutex;

use crate::byteview::ByteView;

struct CacheInner {
    entries: LruCache<String, ByteView>,
    bytes: u64,
}

/// The per-group local store.
pub struct LocalCache {
    budget: u64,
    inner: Mutex<CacheInner>,
}

impl LocalCache {
    /// Create a cache bounded to `budget` bytes of entry data.
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
        }
    }

    #[inline]
    fn entry_size(key: &str, value: &ByteView) -> u64 {
        (key.len() + value.len()) as u64
    }

    /// Insert or replace an entry, evicting least-recently-used entries
    /// until the byte budget holds.
    pub fn add(&self, key: &str, value: ByteView) {
        let mut inner = self.inner.lock();
        let added = Self::entry_size(key, &value);

        if let Some(old) = inner.entries.put(key.to_string(), value) {
            inner.bytes -= Self::entry_size(key, &old);
        }
        inner.bytes += added;

        // The entry just inserted sits at the MRU end; `len() > 1` keeps it
        // from evicting itself, which admits a single oversized entry.
        while inner.bytes > self.budget && inner.entries.len() > 1 {
            if let Some((evicted_key, evicted)) = inner.entries.pop_lru() {
                inner.bytes -= Self::entry_size(&evicted_key, &evicted);
            } else {
                break;
            }
        }
    }

    /// Look up an entry, marking it most-recently-used on hit.
    pub fn get(&self, key: &str) -> Option<ByteView> {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Remove an entry.
    pub fn remove(&self, key: &str) -> Option<ByteView> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.pop(key);
        if let Some(value) = &removed {
            inner.bytes -= Self::entry_size(key, value);
        }
        removed
    }

    /// Whether the key is present, without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.peek(key).is_some()
    }

    /// Current size of all live entries in bytes.
    pub fn bytes(&self) -> u64 {
        self.inner.lock().bytes
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Configured byte budget.
    pub fn budget(&self) -> u64 {
        self.budget
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_get_roundtrip() {
        let cache = LocalCache::new(1024);
        cache.add("Tom", ByteView::from("630"));

        assert_eq!(cache.get("Tom").unwrap().as_slice(), b"630");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.bytes(), 6);
    }

    #[test]
    fn test_miss_returns_none() {
        let cache = LocalCache::new(1024);
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_replace_adjusts_bytes() {
        let cache = LocalCache::new(1024);
        cache.add("k", ByteView::from("original"));
        assert_eq!(cache.bytes(), 9);

        cache.add("k", ByteView::from("replaced content"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.bytes(), 17);
        assert_eq!(cache.get("k").unwrap().as_slice(), b"replaced content");
    }

    #[test]
    fn test_lru_eviction_under_budget_pressure() {
        // Each entry is 2 bytes of key + 8 bytes of value = 10 bytes.
        let cache = LocalCache::new(30);
        cache.add("k1", ByteView::from("aaaaaaaa"));
        cache.add("k2", ByteView::from("bbbbbbbb"));
        cache.add("k3", ByteView::from("cccccccc"));
        assert_eq!(cache.len(), 3);

        // Touch k1 so k2 becomes the LRU victim.
        cache.get("k1");
        cache.add("k4", ByteView::from("dddddddd"));

        assert!(cache.bytes() <= 30);
        assert!(cache.contains("k1"));
        assert!(!cache.contains("k2"));
        assert!(cache.contains("k3"));
        assert!(cache.contains("k4"));
    }

    #[test]
    fn test_budget_invariant_after_many_inserts() {
        let cache = LocalCache::new(100);
        for i in 0..50 {
            cache.add(&format!("key-{i}"), ByteView::from(vec![0u8; 10]));
            assert!(cache.bytes() <= 100, "budget exceeded: {}", cache.bytes());
        }
    }

    #[test]
    fn test_oversized_entry_admitted_after_full_eviction() {
        let cache = LocalCache::new(16);
        cache.add("a", ByteView::from("1234"));
        cache.add("b", ByteView::from("5678"));

        cache.add("big", ByteView::from(vec![0u8; 64]));

        assert_eq!(cache.len(), 1);
        assert!(cache.contains("big"));
        assert!(cache.bytes() > cache.budget());
    }

    #[test]
    fn test_zero_length_value_is_cached() {
        let cache = LocalCache::new(64);
        cache.add("empty", ByteView::from(Vec::new()));
        let view = cache.get("empty").unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn test_remove() {
        let cache = LocalCache::new(64);
        cache.add("k", ByteView::from("v"));
        assert_eq!(cache.remove("k").unwrap().as_slice(), b"v");
        assert_eq!(cache.bytes(), 0);
        assert!(cache.remove("k").is_none());
    }
}
