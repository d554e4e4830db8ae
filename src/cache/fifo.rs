use std::collections::VecDeque;

use super::lru::DEFAULT_CAPACITY;
use super::{Cache, CacheKey, CacheValue};

/// First-in-first-out eviction: reads never change which key goes next.
pub struct FifoCache {
    delegate: Box<dyn Cache>,
    key_list: VecDeque<CacheKey>,
    capacity: usize,
}

impl FifoCache {
    #[must_use]
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self::with_capacity(delegate, DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(delegate: Box<dyn Cache>, capacity: usize) -> Self {
        Self {
            delegate,
            key_list: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }
}

impl Cache for FifoCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&mut self, key: CacheKey, value: CacheValue) {
        if !self.key_list.contains(&key) {
            self.key_list.push_back(key.clone());
            if self.key_list.len() > self.capacity
                && let Some(oldest) = self.key_list.pop_front()
            {
                self.delegate.remove(&oldest);
            }
        }
        self.delegate.put(key, value);
    }

    fn get(&mut self, key: &CacheKey) -> Option<CacheValue> {
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
        self.key_list.clear();
    }

    fn len(&self) -> usize {
        self.delegate.len()
    }

    fn tracks_reads(&self) -> bool {
        self.delegate.tracks_reads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PerpetualCache;

    #[test]
    fn reads_do_not_save_the_oldest_key() {
        let mut cache = FifoCache::with_capacity(Box::new(PerpetualCache::new("fifo")), 2);
        let (a, b, c) = (
            CacheKey::from_parts([1_i64]),
            CacheKey::from_parts([2_i64]),
            CacheKey::from_parts([3_i64]),
        );
        cache.put(a.clone(), Vec::new());
        cache.put(b.clone(), Vec::new());
        cache.get(&a);
        cache.put(c.clone(), Vec::new());
        assert!(cache.peek(&a).is_none());
        assert!(cache.peek(&b).is_some());
        assert!(cache.peek(&c).is_some());
    }
}
