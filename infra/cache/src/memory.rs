//! In-process [`HashCache`] engine.

use crate::engine::HashCache;
use crate::error::CacheError;
use crate::pattern::{glob_match, validate};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::ops::Deref;
use std::sync::Arc;
use tracing::trace;

type Hash = FxHashMap<String, String>;

/// The shared state of a [`MemoryCache`].
#[derive(Debug, Default)]
pub struct MemoryCacheInner {
    hashes: RwLock<FxHashMap<String, Hash>>,
}

/// A thread-safe, in-process hash cache.
///
/// Every command takes the lock exactly once, so single commands are atomic and concurrent
/// `hset`s on the same field resolve last-write-wins. The handle is reference-counted and can be
/// cloned freely across tasks.
///
/// ```rust
/// use gts_cache::{HashCache, MemoryCache};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), gts_cache::CacheError> {
/// let cache = MemoryCache::new();
/// cache.hset("k", "f", "v1".to_owned()).await?;
/// cache.hset("k", "f", "v2".to_owned()).await?;
/// assert_eq!(cache.hget("k", "f").await?.as_deref(), Some("v2"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<MemoryCacheInner>,
}

impl Deref for MemoryCache {
    type Target = MemoryCacheInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of hashes currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hashes.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashes.read().is_empty()
    }
}

impl HashCache for MemoryCache {
    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), CacheError> {
        self.hashes.write().entry(key.to_owned()).or_default().insert(field.to_owned(), value);
        trace!(key, field, "HSET");
        Ok(())
    }

    async fn hset_existing(&self, key: &str, field: &str, value: String) -> Result<bool, CacheError> {
        let mut hashes = self.hashes.write();
        let written = match hashes.get_mut(key).and_then(|hash| hash.get_mut(field)) {
            Some(slot) => {
                *slot = value;
                true
            },
            None => false,
        };
        drop(hashes);
        trace!(key, field, written, "HSET XX");
        Ok(written)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        Ok(self.hashes.read().get(key).and_then(|hash| hash.get(field)).cloned())
    }

    async fn hget_all(&self, key: &str) -> Result<Hash, CacheError> {
        Ok(self.hashes.read().get(key).cloned().unwrap_or_default())
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self.hashes.write().remove(key).is_some();
        trace!(key, removed, "DEL");
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        validate(pattern)?;
        Ok(self.hashes.read().keys().filter(|key| glob_match(pattern, key)).cloned().collect())
    }
}
