use std::time::{Duration, Instant};

use super::{Cache, CacheKey, CacheValue};

/// Clears the whole delegate once `interval` has passed since the last clear.
///
/// Staleness is checked lazily on access; read-only calls report an empty cache while stale
/// and leave the actual clear to the next mutating call.
pub struct ScheduledCache {
    delegate: Box<dyn Cache>,
    interval: Duration,
    last_clear: Instant,
}

impl ScheduledCache {
    #[must_use]
    pub fn new(delegate: Box<dyn Cache>, interval: Duration) -> Self {
        Self {
            delegate,
            interval,
            last_clear: Instant::now(),
        }
    }

    fn is_stale(&self) -> bool {
        self.last_clear.elapsed() > self.interval
    }

    fn clear_when_stale(&mut self) -> bool {
        if self.is_stale() {
            self.clear();
            true
        } else {
            false
        }
    }
}

impl Cache for ScheduledCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&mut self, key: CacheKey, value: CacheValue) {
        self.clear_when_stale();
        self.delegate.put(key, value);
    }

    fn get(&mut self, key: &CacheKey) -> Option<CacheValue> {
        if self.clear_when_stale() {
            None
        } else {
            self.delegate.get(key)
        }
    }

    fn peek(&self, key: &CacheKey) -> Option<CacheValue> {
        if self.is_stale() {
            None
        } else {
            self.delegate.peek(key)
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheValue> {
        self.clear_when_stale();
        self.delegate.remove(key)
    }

    fn clear(&mut self) {
        self.last_clear = Instant::now();
        self.delegate.clear();
    }

    fn len(&self) -> usize {
        if self.is_stale() { 0 } else { self.delegate.len() }
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
    fn entries_disappear_after_interval() {
        let mut cache = ScheduledCache::new(
            Box::new(PerpetualCache::new("sched")),
            Duration::from_millis(20),
        );
        let key = CacheKey::from_parts([1_i64]);
        cache.put(key.clone(), Vec::new());
        assert!(cache.get(&key).is_some());
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.len(), 0);
        assert!(cache.get(&key).is_none());
    }
}
