use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::{FifoCache, LruCache, PerpetualCache, ScheduledCache, SharedCache, lru::DEFAULT_CAPACITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    #[default]
    Lru,
    Fifo,
    /// No eviction; the cache only shrinks when cleared.
    None,
}

/// Serializable cache options for one namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub eviction: EvictionPolicy,
    pub size: usize,
    pub flush_interval_ms: Option<u64>,
    pub blocking: bool,
    pub blocking_timeout_ms: Option<u64>,
    pub flush_on_commit: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            eviction: EvictionPolicy::Lru,
            size: DEFAULT_CAPACITY,
            flush_interval_ms: None,
            blocking: false,
            blocking_timeout_ms: None,
            flush_on_commit: true,
        }
    }
}

impl CacheSettings {
    #[must_use]
    pub fn builder(&self, id: impl Into<String>) -> CacheBuilder {
        let mut builder = CacheBuilder::new(id)
            .eviction(self.eviction)
            .size(self.size)
            .blocking(self.blocking)
            .flush_on_commit(self.flush_on_commit);
        if let Some(ms) = self.flush_interval_ms {
            builder = builder.flush_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.blocking_timeout_ms {
            builder = builder.blocking_timeout(Duration::from_millis(ms));
        }
        builder
    }
}

/// Assembles a namespace cache: base store, eviction, optional scheduled clearing, then
/// the shared handle that adds locking, statistics and optional per-key blocking.
#[derive(Debug, Clone)]
pub struct CacheBuilder {
    id: String,
    settings: CacheSettings,
    flush_interval: Option<Duration>,
    blocking_timeout: Option<Duration>,
}

impl CacheBuilder {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            settings: CacheSettings::default(),
            flush_interval: None,
            blocking_timeout: None,
        }
    }

    #[must_use]
    pub fn eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.settings.eviction = eviction;
        self
    }

    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.settings.size = size;
        self
    }

    #[must_use]
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.settings.blocking = blocking;
        self
    }

    #[must_use]
    pub fn blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn flush_on_commit(mut self, flush_on_commit: bool) -> Self {
        self.settings.flush_on_commit = flush_on_commit;
        self
    }

    #[must_use]
    pub fn build(self) -> SharedCache {
        let base = Box::new(PerpetualCache::new(self.id.clone()));
        let mut chain: Box<dyn super::Cache> = match self.settings.eviction {
            EvictionPolicy::Lru => Box::new(LruCache::with_capacity(base, self.settings.size)),
            EvictionPolicy::Fifo => Box::new(FifoCache::with_capacity(base, self.settings.size)),
            EvictionPolicy::None => base,
        };
        if let Some(interval) = self.flush_interval {
            chain = Box::new(ScheduledCache::new(chain, interval));
        }
        tracing::debug!(
            cache = %self.id,
            eviction = ?self.settings.eviction,
            size = self.settings.size,
            blocking = self.settings.blocking,
            "building namespace cache"
        );
        let blocking = self.settings.blocking.then_some(self.blocking_timeout);
        SharedCache::new(chain, self.settings.flush_on_commit, blocking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: CacheSettings =
            serde_json::from_str(r#"{"eviction":"fifo","size":2,"blocking":true}"#).unwrap();
        assert_eq!(settings.eviction, EvictionPolicy::Fifo);
        assert!(settings.flush_on_commit);
        let cache = settings.builder("ns.a").build();
        assert_eq!(cache.id(), "ns.a");
        assert!(cache.is_blocking());
    }
}
