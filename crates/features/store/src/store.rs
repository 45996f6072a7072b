use crate::error::{StoreError, StoreErrorExt};
use gts_cache::HashCache;
use gts_domain::constants::{GROUP_KEY_PATTERN, GROUP_KEY_PREFIX};
use gts_domain::model::{TransactionGroup, TransactionItem, TransactionStatus};
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache key of the hash holding every item of `group_id`.
#[must_use]
pub fn group_key(group_id: &str) -> String {
    format!("{GROUP_KEY_PREFIX}{group_id}")
}

/// A group as found during a key scan. `items` is an error when any stored value fails to decode.
#[derive(Debug)]
pub(crate) struct ScannedGroup {
    pub(crate) id: String,
    pub(crate) items: Result<Vec<TransactionItem>, StoreError>,
}

#[derive(Debug)]
pub struct TxGroupStoreInner<C> {
    cache: C,
}

/// Persistence of transaction groups over a [`HashCache`].
///
/// Every group is one hash under [`group_key`]; fields are task keys and values are the JSON
/// encoded items. The store adds no locking on top of the cache: each call is as atomic as the
/// single cache command it issues, and nothing more.
///
/// ```rust
/// use gts_cache::MemoryCache;
/// use gts_domain::model::{TransactionItem, TransactionRole, TransactionStatus};
/// use gts_store::TxGroupStore;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), gts_store::StoreError> {
/// let store = TxGroupStore::new(MemoryCache::new());
/// store.add_item("G1", &TransactionItem::new("G1", TransactionRole::Participant)).await?;
/// assert_eq!(store.find_group_status("G1").await, TransactionStatus::Created);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TxGroupStore<C> {
    inner: Arc<TxGroupStoreInner<C>>,
}

impl<C> Clone for TxGroupStore<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C> Deref for TxGroupStore<C> {
    type Target = TxGroupStoreInner<C>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<C: HashCache> TxGroupStore<C> {
    pub fn new(cache: C) -> Self {
        Self { inner: Arc::new(TxGroupStoreInner { cache }) }
    }

    #[must_use]
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Upserts every item of `group`, in list order.
    ///
    /// The first failure aborts the call. Items written before it stay written; re-submitting
    /// the same group is safe since writes are keyed by task key.
    pub async fn save_group(&self, group: &TransactionGroup) -> Result<(), StoreError> {
        let key = group_key(&group.id);
        for item in &group.item_list {
            self.write_item(&key, item).await?;
        }
        debug!(group_id = %group.id, items = group.item_list.len(), "Transaction group saved");
        Ok(())
    }

    /// Upserts one item. The group hash is created on demand.
    pub async fn add_item(&self, group_id: &str, item: &TransactionItem) -> Result<(), StoreError> {
        self.write_item(&group_key(group_id), item).await?;
        debug!(group_id, task_key = %item.task_key, "Transaction item added");
        Ok(())
    }

    /// Current items of a group in unspecified order; empty when the group does not exist.
    pub async fn list_items(&self, group_id: &str) -> Result<Vec<TransactionItem>, StoreError> {
        let entries = self
            .cache
            .hget_all(&group_key(group_id))
            .await
            .context("Failed to read transaction group")?;
        entries.values().map(|raw| decode(raw)).collect()
    }

    /// Sets the status of one stored item.
    ///
    /// This is a read followed by a conditional write. Concurrent updates of the same item race
    /// and the last write wins. If the item or its group is deleted in between, nothing is
    /// written back and the call fails with [`StoreError::ItemNotFound`].
    pub async fn update_item_status(
        &self,
        group_id: &str,
        task_key: &str,
        status: TransactionStatus,
    ) -> Result<(), StoreError> {
        let key = group_key(group_id);
        let not_found = |context: &'static str| StoreError::ItemNotFound {
            group_id: group_id.to_owned(),
            task_key: task_key.to_owned(),
            context: Some(context.into()),
        };

        let raw = self
            .cache
            .hget(&key, task_key)
            .await
            .context("Failed to read transaction item")?
            .ok_or_else(|| not_found("Item is not stored"))?;

        let mut item = decode(&raw)?;
        item.status = status;
        let raw = encode(&item)?;
        let written = self
            .cache
            .hset_existing(&key, task_key, raw)
            .await
            .context("Failed to write transaction item")?;
        if !written {
            return Err(not_found("Item was deleted before its status was written"));
        }

        debug!(group_id, task_key, status = status.code(), "Transaction item status updated");
        Ok(())
    }

    /// Status of the group descriptor (the item keyed by the group id itself).
    ///
    /// Never fails: a missing group, a missing descriptor or any fault reads as
    /// [`TransactionStatus::RolledBack`].
    pub async fn find_group_status(&self, group_id: &str) -> TransactionStatus {
        match self.read_descriptor(group_id).await {
            Ok(Some(item)) => item.status,
            Ok(None) => TransactionStatus::RolledBack,
            Err(err) => {
                warn!(group_id, error = %err, "Group status unreadable, reporting rolled back");
                TransactionStatus::RolledBack
            },
        }
    }

    /// Removes the whole group. Returns whether anything was stored.
    pub async fn delete_group(&self, group_id: &str) -> Result<bool, StoreError> {
        let removed =
            self.cache.del(&group_key(group_id)).await.context("Failed to delete transaction group")?;
        debug!(group_id, removed, "Transaction group deleted");
        Ok(removed)
    }

    /// Every stored group with its items. Groups holding undecodable items are left out.
    pub async fn list_all_groups(&self) -> Result<Vec<TransactionGroup>, StoreError> {
        let groups = self
            .scan_groups()
            .await?
            .into_iter()
            .filter_map(|group| match group.items {
                Ok(item_list) => Some(TransactionGroup { id: group.id, item_list }),
                Err(err) => {
                    warn!(group_id = %group.id, error = %err, "Skipping undecodable group");
                    None
                },
            })
            .collect();
        Ok(groups)
    }

    pub(crate) async fn scan_groups(&self) -> Result<Vec<ScannedGroup>, StoreError> {
        let keys =
            self.cache.keys(GROUP_KEY_PATTERN).await.context("Failed to enumerate groups")?;

        let mut groups = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(id) = key.strip_prefix(GROUP_KEY_PREFIX) else {
                continue;
            };
            let entries =
                self.cache.hget_all(&key).await.context("Failed to read transaction group")?;
            let items = entries.values().map(|raw| decode(raw)).collect();
            groups.push(ScannedGroup { id: id.to_owned(), items });
        }
        Ok(groups)
    }

    async fn read_descriptor(&self, group_id: &str) -> Result<Option<TransactionItem>, StoreError> {
        let raw = self
            .cache
            .hget(&group_key(group_id), group_id)
            .await
            .context("Failed to read group descriptor")?;
        raw.as_deref().map(decode).transpose()
    }

    async fn write_item(&self, key: &str, item: &TransactionItem) -> Result<(), StoreError> {
        self.cache
            .hset(key, &item.task_key, encode(item)?)
            .await
            .context("Failed to write transaction item")?;
        Ok(())
    }
}

fn encode(item: &TransactionItem) -> Result<String, StoreError> {
    serde_json::to_string(item).context("Failed to encode transaction item")
}

fn decode(raw: &str) -> Result<TransactionItem, StoreError> {
    serde_json::from_str::<TransactionItem>(raw).context("Failed to decode transaction item")
}
