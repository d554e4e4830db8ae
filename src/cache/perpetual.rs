use std::collections::HashMap;

use super::{Cache, CacheKey, CacheValue};

/// Unbounded base store at the bottom of every cache chain.
#[derive(Debug, Default)]
pub struct PerpetualCache {
    id: String,
    entries: HashMap<CacheKey, CacheValue>,
}

impl PerpetualCache {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: HashMap::new(),
        }
    }
}

impl Cache for PerpetualCache {
    fn id(&self) -> &str {
        &self.id
    }

    fn put(&mut self, key: CacheKey, value: CacheValue) {
        self.entries.insert(key, value);
    }

    fn get(&mut self, key: &CacheKey) -> Option<CacheValue> {
        self.entries.get(key).cloned()
    }

    fn peek(&self, key: &CacheKey) -> Option<CacheValue> {
        self.entries.get(key).cloned()
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheValue> {
        self.entries.remove(key)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
