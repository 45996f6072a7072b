//! The cache contract consumed by the transaction group store.

use crate::error::CacheError;
use fxhash::FxHashMap;
use std::future::Future;
use std::sync::Arc;

/// Hash-per-key cache commands.
///
/// Implementations must make every single command atomic with respect to the key it touches.
/// Nothing more is promised: a read followed by a write is two independent commands. The one
/// conditional command is [`HashCache::hset_existing`].
pub trait HashCache: Send + Sync + 'static {
    /// Sets `field` inside the hash stored at `key`, creating the hash if needed.
    fn hset(
        &self,
        key: &str,
        field: &str,
        value: String,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Overwrites `field` only if it is already present in the hash at `key`. Returns whether the
    /// write happened; a missing hash or field is left untouched.
    ///
    /// The existence check and the write must be one atomic step (`WATCH`/`MULTI` or a script on
    /// Redis).
    fn hset_existing(
        &self,
        key: &str,
        field: &str,
        value: String,
    ) -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// Returns the value of `field` in the hash at `key`, or `None` when either is missing.
    fn hget(
        &self,
        key: &str,
        field: &str,
    ) -> impl Future<Output = Result<Option<String>, CacheError>> + Send;

    /// Returns every field of the hash at `key`; empty when the key does not exist.
    fn hget_all(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<FxHashMap<String, String>, CacheError>> + Send;

    /// Removes the whole hash at `key`. Returns whether something was removed.
    fn del(&self, key: &str) -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// Lists keys matching a glob `pattern` (see [`crate::glob_match`]).
    fn keys(&self, pattern: &str) -> impl Future<Output = Result<Vec<String>, CacheError>> + Send;
}

impl<C: HashCache> HashCache for Arc<C> {
    fn hset(
        &self,
        key: &str,
        field: &str,
        value: String,
    ) -> impl Future<Output = Result<(), CacheError>> + Send {
        (**self).hset(key, field, value)
    }

    fn hset_existing(
        &self,
        key: &str,
        field: &str,
        value: String,
    ) -> impl Future<Output = Result<bool, CacheError>> + Send {
        (**self).hset_existing(key, field, value)
    }

    fn hget(
        &self,
        key: &str,
        field: &str,
    ) -> impl Future<Output = Result<Option<String>, CacheError>> + Send {
        (**self).hget(key, field)
    }

    fn hget_all(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<FxHashMap<String, String>, CacheError>> + Send {
        (**self).hget_all(key)
    }

    fn del(&self, key: &str) -> impl Future<Output = Result<bool, CacheError>> + Send {
        (**self).del(key)
    }

    fn keys(&self, pattern: &str) -> impl Future<Output = Result<Vec<String>, CacheError>> + Send {
        (**self).keys(pattern)
    }
}
