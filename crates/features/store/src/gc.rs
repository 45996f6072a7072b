//! Purging of fully resolved transaction groups.
//!
//! A group is resolved once its initiator rolled back or once every item committed. Anything
//! else, including groups whose items no longer decode, is left alone.
//!
//! A matching group is read again right before it is deleted, so items enlisted since the scan
//! keep it alive. The re-read and the delete are still two cache commands: an item written
//! between them is deleted with its group, like the status-update race in the store.

use crate::error::StoreError;
use crate::store::TxGroupStore;
use gts_cache::HashCache;
use gts_domain::model::{TransactionItem, TransactionRole, TransactionStatus};
use tracing::{debug, info, warn};

/// How a group stands with respect to garbage collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The initiator (a `Start` item) is rolled back.
    RolledBack,
    /// Every item is committed.
    Committed,
    InFlight,
}

impl Resolution {
    /// Classifies a group by its items. The rollback check wins over the commit check.
    #[must_use]
    pub fn of(items: &[TransactionItem]) -> Self {
        if items.iter().any(|item| {
            item.role == TransactionRole::Start && item.status == TransactionStatus::RolledBack
        }) {
            Self::RolledBack
        } else if !items.is_empty()
            && items.iter().all(|item| item.status == TransactionStatus::Committed)
        {
            Self::Committed
        } else {
            Self::InFlight
        }
    }
}

/// Outcome of one [`GarbageCollector::sweep`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed_rolled_back: usize,
    pub removed_committed: usize,
    /// Groups left in place because their items could not be decoded.
    pub skipped: usize,
}

impl SweepReport {
    #[must_use]
    pub const fn removed(&self) -> usize {
        self.removed_rolled_back + self.removed_committed
    }
}

/// Deletes resolved groups from a [`TxGroupStore`].
#[derive(Debug, Clone)]
pub struct GarbageCollector<C> {
    store: TxGroupStore<C>,
}

impl<C: HashCache> GarbageCollector<C> {
    pub const fn new(store: TxGroupStore<C>) -> Self {
        Self { store }
    }

    /// Deletes every group whose initiator rolled back. Returns the number of deleted groups.
    pub async fn remove_rolled_back_groups(&self) -> Result<usize, StoreError> {
        let report = self.sweep_matching(|r| r == Resolution::RolledBack).await?;
        Ok(report.removed())
    }

    /// Deletes every group whose items are all committed. Returns the number of deleted groups.
    pub async fn remove_committed_groups(&self) -> Result<usize, StoreError> {
        let report = self.sweep_matching(|r| r == Resolution::Committed).await?;
        Ok(report.removed())
    }

    /// One pass over all groups, deleting both kinds of resolved groups.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let report = self.sweep_matching(|r| r != Resolution::InFlight).await?;
        if report.removed() > 0 || report.skipped > 0 {
            info!(
                scanned = report.scanned,
                rolled_back = report.removed_rolled_back,
                committed = report.removed_committed,
                skipped = report.skipped,
                "Garbage collection sweep finished"
            );
        } else {
            debug!(scanned = report.scanned, "Garbage collection sweep found nothing to remove");
        }
        Ok(report)
    }

    async fn sweep_matching(
        &self,
        wanted: impl Fn(Resolution) -> bool,
    ) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();

        for group in self.store.scan_groups().await? {
            report.scanned += 1;

            let items = match group.items {
                Ok(items) => items,
                Err(err) => {
                    warn!(group_id = %group.id, error = %err, "Leaving undecodable group in place");
                    report.skipped += 1;
                    continue;
                },
            };

            if !wanted(Resolution::of(&items)) {
                continue;
            }

            let resolution = match self.store.list_items(&group.id).await {
                Ok(current) => Resolution::of(&current),
                Err(err @ StoreError::Serialization { .. }) => {
                    warn!(group_id = %group.id, error = %err, "Leaving undecodable group in place");
                    report.skipped += 1;
                    continue;
                },
                Err(err) => return Err(err),
            };
            if !wanted(resolution) {
                debug!(group_id = %group.id, ?resolution, "Group changed since the scan, keeping it");
                continue;
            }

            if self.store.delete_group(&group.id).await? {
                match resolution {
                    Resolution::RolledBack => report.removed_rolled_back += 1,
                    Resolution::Committed => report.removed_committed += 1,
                    Resolution::InFlight => {},
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, role: TransactionRole, status: TransactionStatus) -> TransactionItem {
        TransactionItem::new(key, role).with_status(status)
    }

    #[test]
    fn test_rolled_back_initiator_resolves_group() {
        let items = [
            item("G1", TransactionRole::Participant, TransactionStatus::Committed),
            item("init", TransactionRole::Start, TransactionStatus::RolledBack),
        ];
        assert_eq!(Resolution::of(&items), Resolution::RolledBack);
    }

    #[test]
    fn test_rolled_back_participant_alone_is_in_flight() {
        let items = [
            item("G1", TransactionRole::Participant, TransactionStatus::Created),
            item("p1", TransactionRole::Participant, TransactionStatus::RolledBack),
        ];
        assert_eq!(Resolution::of(&items), Resolution::InFlight);
    }

    #[test]
    fn test_all_committed_resolves_group() {
        let items = [
            item("G1", TransactionRole::Participant, TransactionStatus::Committed),
            item("init", TransactionRole::Start, TransactionStatus::Committed),
        ];
        assert_eq!(Resolution::of(&items), Resolution::Committed);
    }

    #[test]
    fn test_mixed_and_empty_groups_are_in_flight() {
        let mixed = [
            item("G1", TransactionRole::Participant, TransactionStatus::Committed),
            item("p1", TransactionRole::Participant, TransactionStatus::Created),
        ];
        assert_eq!(Resolution::of(&mixed), Resolution::InFlight);
        assert_eq!(Resolution::of(&[]), Resolution::InFlight);
    }
}
