//! Namespace caches and the building blocks they are assembled from.
//!
//! A chain is a stack of [`Cache`] layers over a [`PerpetualCache`]; layers hold no locks
//! of their own. [`SharedCache`] owns a finished chain behind one lock and is what
//! statements and sessions hold.

mod builder;
mod fifo;
mod key;
mod lru;
mod perpetual;
mod scheduled;
mod shared;
mod transactional;

pub use builder::{CacheBuilder, CacheSettings, EvictionPolicy};
pub use fifo::FifoCache;
pub use key::CacheKey;
pub use lru::LruCache;
pub use perpetual::PerpetualCache;
pub use scheduled::ScheduledCache;
pub use shared::{KeyLockGuard, SharedCache};
pub use transactional::{TransactionalCache, TransactionalCacheManager};

use crate::results::CustomDbRow;

/// What a cache stores for one key: the rows a query produced.
pub type CacheValue = Vec<CustomDbRow>;

/// One layer of a cache chain.
pub trait Cache: Send + Sync {
    fn id(&self) -> &str;

    fn put(&mut self, key: CacheKey, value: CacheValue);

    /// Look up `key`, letting the layer record the access.
    fn get(&mut self, key: &CacheKey) -> Option<CacheValue>;

    /// Look up `key` without recording the access.
    fn peek(&self, key: &CacheKey) -> Option<CacheValue>;

    fn remove(&mut self, key: &CacheKey) -> Option<CacheValue>;

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `get` changes layer state, so concurrent readers must be serialised.
    fn tracks_reads(&self) -> bool {
        false
    }
}
