use std::collections::HashMap;

use super::{CacheKey, CacheValue, SharedCache};

/// Per-session view of one shared cache.
///
/// When the shared cache flushes on commit, puts are staged and a clear only marks the
/// cache for clearing; both reach the shared cache on `commit` and are dropped on
/// `rollback`. Otherwise every call writes straight through.
#[derive(Debug)]
pub struct TransactionalCache {
    delegate: SharedCache,
    clear_on_commit: bool,
    entries_to_add_on_commit: HashMap<CacheKey, CacheValue>,
}

impl TransactionalCache {
    #[must_use]
    pub fn new(delegate: SharedCache) -> Self {
        Self {
            delegate,
            clear_on_commit: false,
            entries_to_add_on_commit: HashMap::new(),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        let value = self.delegate.get(key);
        if self.clear_on_commit { None } else { value }
    }

    pub fn put(&mut self, key: CacheKey, value: CacheValue) {
        if self.delegate.flush_on_commit() {
            self.entries_to_add_on_commit.insert(key, value);
        } else {
            self.delegate.put(key, value);
        }
    }

    /// Store a value this session just loaded under the cache's key lock.
    ///
    /// A blocking cache publishes it at once so callers waiting on the same key read it
    /// instead of loading it again. After a pending clear the session may be reading its
    /// own uncommitted writes, so the value is staged like any other put.
    pub fn put_loaded(&mut self, key: CacheKey, value: CacheValue) {
        if self.delegate.is_blocking() && !self.clear_on_commit {
            self.delegate.put(key, value);
        } else {
            self.put(key, value);
        }
    }

    pub fn clear(&mut self) {
        if self.delegate.flush_on_commit() {
            self.clear_on_commit = true;
            self.entries_to_add_on_commit.clear();
        } else {
            self.delegate.clear();
        }
    }

    pub fn commit(&mut self) {
        if self.clear_on_commit {
            self.delegate.clear();
        }
        for (key, value) in self.entries_to_add_on_commit.drain() {
            self.delegate.put(key, value);
        }
        self.reset();
    }

    pub fn rollback(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.clear_on_commit = false;
        self.entries_to_add_on_commit.clear();
    }
}

/// The transactional views one session holds, keyed by shared cache id.
#[derive(Debug, Default)]
pub struct TransactionalCacheManager {
    caches: HashMap<String, TransactionalCache>,
}

impl TransactionalCacheManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn view(&mut self, cache: &SharedCache) -> &mut TransactionalCache {
        self.caches
            .entry(cache.id().to_owned())
            .or_insert_with(|| TransactionalCache::new(cache.clone()))
    }

    pub fn get(&mut self, cache: &SharedCache, key: &CacheKey) -> Option<CacheValue> {
        self.view(cache).get(key)
    }

    pub fn put(&mut self, cache: &SharedCache, key: CacheKey, value: CacheValue) {
        self.view(cache).put(key, value);
    }

    pub fn put_loaded(&mut self, cache: &SharedCache, key: CacheKey, value: CacheValue) {
        self.view(cache).put_loaded(key, value);
    }

    pub fn clear(&mut self, cache: &SharedCache) {
        self.view(cache).clear();
    }

    pub fn commit(&mut self) {
        for cache in self.caches.values_mut() {
            cache.commit();
        }
    }

    pub fn rollback(&mut self) {
        for cache in self.caches.values_mut() {
            cache.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBuilder;

    #[test]
    fn staged_puts_reach_shared_cache_on_commit() {
        let shared = CacheBuilder::new("ns").build();
        let mut tcm = TransactionalCacheManager::new();
        let key = CacheKey::from_parts([1_i64]);
        tcm.put(&shared, key.clone(), Vec::new());
        assert!(shared.get(&key).is_none());
        tcm.commit();
        assert!(shared.get(&key).is_some());
    }

    #[test]
    fn rollback_discards_staged_puts_and_clears() {
        let shared = CacheBuilder::new("ns").build();
        let key = CacheKey::from_parts([1_i64]);
        shared.put(key.clone(), Vec::new());
        let mut tcm = TransactionalCacheManager::new();
        tcm.clear(&shared);
        assert!(tcm.get(&shared, &key).is_none());
        tcm.put(&shared, CacheKey::from_parts([2_i64]), Vec::new());
        tcm.rollback();
        assert!(shared.get(&key).is_some());
        assert_eq!(shared.len(), 1);
    }

    #[test]
    fn loaded_values_publish_at_once_on_blocking_caches() {
        let shared = CacheBuilder::new("ns").blocking(true).build();
        let mut tcm = TransactionalCacheManager::new();
        let key = CacheKey::from_parts([1_i64]);
        tcm.put_loaded(&shared, key.clone(), Vec::new());
        assert!(shared.get(&key).is_some());

        tcm.clear(&shared);
        let other = CacheKey::from_parts([2_i64]);
        tcm.put_loaded(&shared, other.clone(), Vec::new());
        assert!(shared.get(&other).is_none());
        tcm.commit();
        assert!(shared.get(&other).is_some());
        assert!(shared.get(&key).is_none());
    }

    #[test]
    fn write_through_when_not_flushing_on_commit() {
        let shared = CacheBuilder::new("ns").flush_on_commit(false).build();
        let mut tcm = TransactionalCacheManager::new();
        let key = CacheKey::from_parts([1_i64]);
        tcm.put(&shared, key.clone(), Vec::new());
        assert!(shared.get(&key).is_some());
        tcm.clear(&shared);
        assert!(shared.is_empty());
    }
}
