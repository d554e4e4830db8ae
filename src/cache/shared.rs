use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{Cache, CacheKey, CacheValue};
use crate::error::SqlMapperError;

type KeyLocks = Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>;

/// Cloneable handle to a namespace cache chain shared by every session.
///
/// Every operation on the chain runs under one lock. Chains whose reads reorder state
/// (LRU) take the exclusive side for `get`; the rest read under the shared side. The
/// handle also counts requests and hits, and when built as blocking hands out per-key
/// locks so that only one caller loads a missing key at a time.
#[derive(Clone)]
pub struct SharedCache {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    store: RwLock<Box<dyn Cache>>,
    exclusive_reads: bool,
    flush_on_commit: bool,
    requests: AtomicU64,
    hits: AtomicU64,
    blocking: Option<Blocking>,
}

struct Blocking {
    timeout: Option<Duration>,
    locks: Arc<KeyLocks>,
}

/// Held while a caller loads a missing key into a blocking cache.
///
/// Dropping the guard releases the key for the next waiter.
pub struct KeyLockGuard {
    key: CacheKey,
    locks: Arc<KeyLocks>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this guard still hold the mutex: nobody is waiting on it.
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(&self.key);
        }
        self.guard.take();
    }
}

impl SharedCache {
    pub(crate) fn new(
        chain: Box<dyn Cache>,
        flush_on_commit: bool,
        blocking: Option<Option<Duration>>,
    ) -> Self {
        let id = chain.id().to_owned();
        let exclusive_reads = chain.tracks_reads();
        Self {
            inner: Arc::new(Inner {
                id,
                store: RwLock::new(chain),
                exclusive_reads,
                flush_on_commit,
                requests: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                blocking: blocking.map(|timeout| Blocking {
                    timeout,
                    locks: Arc::new(Mutex::new(HashMap::new())),
                }),
            }),
        }
    }

    /// Wrap an arbitrary chain; writes are applied immediately and reads never block.
    #[must_use]
    pub fn from_chain(chain: Box<dyn Cache>) -> Self {
        Self::new(chain, false, None)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Whether sessions stage writes until commit instead of writing straight through.
    #[must_use]
    pub fn flush_on_commit(&self) -> bool {
        self.inner.flush_on_commit
    }

    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.inner.blocking.is_some()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        let value = if self.inner.exclusive_reads {
            self.write().get(key)
        } else {
            self.inner
                .store
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .peek(key)
        };
        let requests = self.inner.requests.fetch_add(1, Ordering::Relaxed) + 1;
        let hits = if value.is_some() {
            self.inner.hits.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            self.inner.hits.load(Ordering::Relaxed)
        };
        tracing::debug!(
            cache = %self.inner.id,
            hit_ratio = hit_ratio(hits, requests),
            "Cache Hit Ratio [{}]: {}",
            self.inner.id,
            hit_ratio(hits, requests)
        );
        value
    }

    pub fn put(&self, key: CacheKey, value: CacheValue) {
        self.write().put(key, value);
    }

    pub fn remove(&self, key: &CacheKey) -> Option<CacheValue> {
        self.write().remove(key)
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        hit_ratio(
            self.inner.hits.load(Ordering::Relaxed),
            self.inner.requests.load(Ordering::Relaxed),
        )
    }

    /// Acquire the load lock for `key`; `None` when the cache is not blocking.
    ///
    /// # Errors
    /// Returns `SqlMapperError::CacheError` if the configured timeout elapses first.
    pub async fn lock_key(&self, key: &CacheKey) -> Result<Option<KeyLockGuard>, SqlMapperError> {
        let Some(blocking) = &self.inner.blocking else {
            return Ok(None);
        };
        let lock = {
            let mut locks = blocking.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = match blocking.timeout {
            Some(timeout) => tokio::time::timeout(timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    SqlMapperError::CacheError(format!(
                        "Couldn't get a lock in {timeout:?} for the key {key} at the cache {}",
                        self.inner.id
                    ))
                })?,
            None => lock.lock_owned().await,
        };
        Ok(Some(KeyLockGuard {
            key: key.clone(),
            locks: Arc::clone(&blocking.locks),
            guard: Some(guard),
        }))
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Box<dyn Cache>> {
        self.inner
            .store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[allow(clippy::cast_precision_loss)]
fn hit_ratio(hits: u64, requests: u64) -> f64 {
    if requests == 0 {
        0.0
    } else {
        hits as f64 / requests as f64
    }
}

impl fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCache")
            .field("id", &self.inner.id)
            .field("flush_on_commit", &self.inner.flush_on_commit)
            .field("blocking", &self.is_blocking())
            .finish_non_exhaustive()
    }
}
