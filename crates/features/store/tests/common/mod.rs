#![allow(dead_code)]

use fxhash::FxHashMap;
use gts_cache::{CacheError, HashCache, MemoryCache};
use gts_domain::model::{TransactionGroup, TransactionItem, TransactionRole, TransactionStatus};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A [`MemoryCache`] that starts refusing writes after a fixed number of successful writes.
#[derive(Debug)]
pub struct FlakyCache {
    pub memory: MemoryCache,
    writes_left: AtomicUsize,
}

impl FlakyCache {
    pub fn failing_after(writes: usize) -> Self {
        Self { memory: MemoryCache::new(), writes_left: AtomicUsize::new(writes) }
    }

    fn take_write(&self) -> Result<(), CacheError> {
        self.writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .map(|_| ())
            .map_err(|_| CacheError::Unavailable { message: "connection reset".into(), context: None })
    }
}

impl HashCache for FlakyCache {
    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), CacheError> {
        self.take_write()?;
        self.memory.hset(key, field, value).await
    }

    async fn hset_existing(&self, key: &str, field: &str, value: String) -> Result<bool, CacheError> {
        self.take_write()?;
        self.memory.hset_existing(key, field, value).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.memory.hget(key, field).await
    }

    async fn hget_all(&self, key: &str) -> Result<FxHashMap<String, String>, CacheError> {
        self.memory.hget_all(key).await
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        self.memory.del(key).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.memory.keys(pattern).await
    }
}

/// A concurrent writer's command, slipped in between two commands of the code under test.
#[derive(Debug)]
pub enum Interference {
    /// Deletes the hash at `key` right after the first `hget` on it returned.
    DeleteAfterRead { key: String },
    /// Writes `field = value` into `key` right before the `hget_all` call numbered `call` (0-based)
    /// reads.
    WriteBeforeScan { call: usize, key: String, field: String, value: String },
}

/// A [`MemoryCache`] that fires one [`Interference`] at the scripted point.
#[derive(Debug)]
pub struct InterleavingCache {
    pub memory: MemoryCache,
    interference: Mutex<Option<Interference>>,
    scans: AtomicUsize,
}

impl InterleavingCache {
    pub fn new(memory: MemoryCache, interference: Interference) -> Self {
        Self { memory, interference: Mutex::new(Some(interference)), scans: AtomicUsize::new(0) }
    }

    fn take_if(&self, fires: impl FnOnce(&Interference) -> bool) -> Option<Interference> {
        let mut slot = self.interference.lock().unwrap();
        if slot.as_ref().is_some_and(fires) { slot.take() } else { None }
    }
}

impl HashCache for InterleavingCache {
    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), CacheError> {
        self.memory.hset(key, field, value).await
    }

    async fn hset_existing(&self, key: &str, field: &str, value: String) -> Result<bool, CacheError> {
        self.memory.hset_existing(key, field, value).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        let value = self.memory.hget(key, field).await?;
        let fired = self.take_if(|i| matches!(i, Interference::DeleteAfterRead { key: k } if k == key));
        if fired.is_some() {
            self.memory.del(key).await?;
        }
        Ok(value)
    }

    async fn hget_all(&self, key: &str) -> Result<FxHashMap<String, String>, CacheError> {
        let call = self.scans.fetch_add(1, Ordering::SeqCst);
        let fired =
            self.take_if(|i| matches!(i, Interference::WriteBeforeScan { call: c, .. } if *c == call));
        if let Some(Interference::WriteBeforeScan { key, field, value, .. }) = fired {
            self.memory.hset(&key, &field, value).await?;
        }
        self.memory.hget_all(key).await
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        self.memory.del(key).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.memory.keys(pattern).await
    }
}

pub fn item(key: &str, role: TransactionRole, status: TransactionStatus) -> TransactionItem {
    TransactionItem::new(key, role).with_status(status)
}

/// Descriptor, initiator and one participant, all in `status`.
pub fn group(id: &str, status: TransactionStatus) -> TransactionGroup {
    TransactionGroup {
        id: id.to_owned(),
        item_list: vec![
            item(id, TransactionRole::Participant, status),
            item(&format!("{id}-init"), TransactionRole::Start, status),
            item(&format!("{id}-p1"), TransactionRole::Participant, status),
        ],
    }
}
