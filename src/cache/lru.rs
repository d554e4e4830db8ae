use ::lru::LruCache as RecencyOrder;

use super::{Cache, CacheKey, CacheValue};

pub const DEFAULT_CAPACITY: usize = 1024;

/// Least-recently-used eviction over a delegate store.
///
/// The recency order is tracked separately from the delegate: `put` records the key as
/// most recent and, once more than `capacity` distinct keys are tracked, drops the least
/// recent one from both. `get` touches the key whether or not the delegate still holds
/// it. No locking happens here; wrap the chain in a [`SharedCache`](super::SharedCache)
/// to share it.
pub struct LruCache {
    delegate: Box<dyn Cache>,
    order: RecencyOrder<CacheKey, ()>,
    capacity: usize,
}

impl LruCache {
    #[must_use]
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self::with_capacity(delegate, DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(delegate: Box<dyn Cache>, capacity: usize) -> Self {
        Self {
            delegate,
            order: RecencyOrder::unbounded(),
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn cycle_key_list(&mut self, key: CacheKey) {
        self.order.put(key, ());
        if self.order.len() > self.capacity
            && let Some((eldest, ())) = self.order.pop_lru()
        {
            tracing::trace!(cache = self.delegate.id(), key = %eldest, "evicting least recently used entry");
            self.delegate.remove(&eldest);
        }
    }
}

impl Cache for LruCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&mut self, key: CacheKey, value: CacheValue) {
        self.delegate.put(key.clone(), value);
        self.cycle_key_list(key);
    }

    fn get(&mut self, key: &CacheKey) -> Option<CacheValue> {
        self.order.get(key);
        self.delegate.get(key)
    }

    fn peek(&self, key: &CacheKey) -> Option<CacheValue> {
        self.delegate.peek(key)
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheValue> {
        self.delegate.remove(key)
    }

    fn clear(&mut self) {
        self.delegate.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.delegate.len()
    }

    fn tracks_reads(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PerpetualCache;

    fn key(i: i64) -> CacheKey {
        CacheKey::from_parts([i])
    }

    fn lru(capacity: usize) -> LruCache {
        LruCache::with_capacity(Box::new(PerpetualCache::new("lru")), capacity)
    }

    #[test]
    fn keeps_everything_up_to_capacity() {
        let mut cache = lru(5);
        for i in 0..5 {
            cache.put(key(i), Vec::new());
        }
        for i in 0..5 {
            assert!(cache.get(&key(i)).is_some(), "key {i} should be cached");
        }
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn evicts_least_recently_touched() {
        let mut cache = lru(5);
        for i in 0..5 {
            cache.put(key(i), Vec::new());
        }
        cache.get(&key(0));
        cache.put(key(5), Vec::new());
        assert!(cache.get(&key(0)).is_some());
        assert!(cache.get(&key(1)).is_none());
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn untouched_keys_evict_in_insertion_order() {
        let mut cache = lru(3);
        for i in 0..3 {
            cache.put(key(i), Vec::new());
        }
        cache.put(key(3), Vec::new());
        cache.put(key(4), Vec::new());
        assert!(cache.peek(&key(0)).is_none());
        assert!(cache.peek(&key(1)).is_none());
        assert!(cache.peek(&key(2)).is_some());
    }

    #[test]
    fn clear_empties_store_and_order() {
        let mut cache = lru(2);
        cache.put(key(1), Vec::new());
        cache.put(key(2), Vec::new());
        cache.clear();
        assert_eq!(cache.len(), 0);
        cache.put(key(3), Vec::new());
        cache.put(key(4), Vec::new());
        assert!(cache.peek(&key(3)).is_some());
        assert!(cache.peek(&key(4)).is_some());
    }
}
