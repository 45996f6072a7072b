mod common;

use common::{InterleavingCache, Interference, group, item};
use gts_cache::{HashCache, MemoryCache};
use gts_domain::model::{TransactionGroup, TransactionRole, TransactionStatus};
use gts_store::{GarbageCollector, SweepReport, TxGroupStore, group_key};

fn rolled_back_group(id: &str) -> TransactionGroup {
    TransactionGroup {
        id: id.to_owned(),
        item_list: vec![
            item(id, TransactionRole::Participant, TransactionStatus::Created),
            item(&format!("{id}-init"), TransactionRole::Start, TransactionStatus::RolledBack),
        ],
    }
}

fn mixed_group(id: &str) -> TransactionGroup {
    TransactionGroup {
        id: id.to_owned(),
        item_list: vec![
            item(id, TransactionRole::Participant, TransactionStatus::Committed),
            item(&format!("{id}-p1"), TransactionRole::Participant, TransactionStatus::Created),
        ],
    }
}

async fn seeded() -> TxGroupStore<MemoryCache> {
    let store = TxGroupStore::new(MemoryCache::new());
    store.save_group(&rolled_back_group("R1")).await.unwrap();
    store.save_group(&group("C1", TransactionStatus::Committed)).await.unwrap();
    store.save_group(&mixed_group("M1")).await.unwrap();
    store
}

#[tokio::test]
async fn test_rollback_sweep_removes_only_rolled_back_groups() {
    let store = seeded().await;
    let gc = GarbageCollector::new(store.clone());

    assert_eq!(gc.remove_rolled_back_groups().await.unwrap(), 1);
    assert!(store.list_items("R1").await.unwrap().is_empty());
    assert_eq!(store.list_items("C1").await.unwrap().len(), 3);
    assert_eq!(store.list_items("M1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_commit_sweep_removes_only_committed_groups() {
    let store = seeded().await;
    let gc = GarbageCollector::new(store.clone());

    assert_eq!(gc.remove_committed_groups().await.unwrap(), 1);
    assert!(store.list_items("C1").await.unwrap().is_empty());
    assert_eq!(store.list_items("R1").await.unwrap().len(), 2);
    assert_eq!(store.list_items("M1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_sweep_reports_and_keeps_in_flight_and_corrupt_groups() {
    let store = seeded().await;
    store.cache().hset(&group_key("X1"), "X1", "not json".to_owned()).await.unwrap();
    let gc = GarbageCollector::new(store.clone());

    let report = gc.sweep().await.unwrap();
    assert_eq!(
        report,
        SweepReport { scanned: 4, removed_rolled_back: 1, removed_committed: 1, skipped: 1 }
    );

    let mut left: Vec<_> = store.cache().keys("transaction:group:*").await.unwrap();
    left.sort();
    assert_eq!(left, vec![group_key("M1"), group_key("X1")]);

    let second = gc.sweep().await.unwrap();
    assert_eq!(second.removed(), 0);
    assert_eq!(second.scanned, 2);
}

#[tokio::test]
async fn test_item_enlisted_after_the_scan_keeps_its_group() {
    let memory = MemoryCache::new();
    TxGroupStore::new(memory.clone())
        .save_group(&group("C1", TransactionStatus::Committed))
        .await
        .unwrap();

    let late = item("late", TransactionRole::Participant, TransactionStatus::Created);
    // Call 0 is the scan, call 1 the re-read right before the delete.
    let store = TxGroupStore::new(InterleavingCache::new(
        memory.clone(),
        Interference::WriteBeforeScan {
            call: 1,
            key: group_key("C1"),
            field: late.task_key.clone(),
            value: serde_json::to_string(&late).unwrap(),
        },
    ));

    let report = GarbageCollector::new(store.clone()).sweep().await.unwrap();

    assert_eq!(report, SweepReport { scanned: 1, ..SweepReport::default() });
    let items = store.list_items("C1").await.unwrap();
    assert_eq!(items.len(), 4);
    assert!(items.contains(&late));
}
