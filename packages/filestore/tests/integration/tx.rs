use std::sync::Arc;

use common::StorageDiff;
use filestore::quota::QuotaStore;
use filestore::store::FileStore;
use filestore::{Commit, ErrorKind, Tx};

use crate::common::TestStore;

fn quota(t: &TestStore) -> Arc<dyn QuotaStore> {
    t.quota.clone()
}

#[tokio::test]
async fn nested_commit_is_deferred_and_root_applies_diff_once() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;

    let root = Tx::begin(&t.db, quota(&t)).await.unwrap();
    assert!(root.is_root());

    let nested = root.nested();
    assert!(!nested.is_root());
    nested.append_diff(StorageDiff::single(alice.id, 100));
    let outcome = nested.commit().await.unwrap();
    assert!(matches!(outcome, Commit::Deferred));
    assert!(!outcome.is_committed());

    let nested = root.nested();
    nested.append_diff(StorageDiff::single(alice.id, 50));
    nested.rollback().await.unwrap();

    assert_eq!(root.pending_diff().get(alice.id), 150);

    match root.commit().await.unwrap() {
        Commit::Committed { quota_error } => assert!(quota_error.is_none()),
        Commit::Deferred => panic!("root commit must be final"),
    }
    assert_eq!(t.user_storage(alice.id).await, 150);
}

#[tokio::test]
async fn deeply_nested_scopes_forward_to_the_root() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;

    let root = Tx::begin(&t.db, quota(&t)).await.unwrap();
    {
        let outer = root.nested();
        let inner = outer.nested();
        inner.append_diff(StorageDiff::single(alice.id, 7));
        outer.append_diff(StorageDiff::single(alice.id, 3));
        inner.commit().await.unwrap();
        outer.commit().await.unwrap();
    }
    assert_eq!(root.pending_diff().get(alice.id), 10);
    assert!(root.commit().await.unwrap().is_committed());
    assert_eq!(t.user_storage(alice.id).await, 10);
}

#[tokio::test]
async fn acquire_joins_an_existing_scope() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;

    let root = Tx::acquire(None, &t.db, quota(&t)).await.unwrap();
    assert!(root.is_root());
    {
        let joined = Tx::acquire(Some(&root), &t.db, quota(&t)).await.unwrap();
        assert!(!joined.is_root());
        let folder = FileStore::new(joined.conn())
            .create_folder(alice.id, None, "docs")
            .await
            .unwrap();
        joined.append_diff(StorageDiff::single(alice.id, 5));
        joined.commit().await.unwrap();

        // Same transaction: the root sees the nested write.
        let seen = FileStore::new(root.conn()).get_file(folder.id).await.unwrap();
        assert_eq!(seen.name, "docs");
    }
    root.commit().await.unwrap();

    assert_eq!(t.store().children(alice.id, None).await.unwrap().len(), 1);
    assert_eq!(t.user_storage(alice.id).await, 5);
}

#[tokio::test]
async fn root_rollback_discards_writes_and_diff() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;

    let root = Tx::begin(&t.db, quota(&t)).await.unwrap();
    let folder = FileStore::new(root.conn())
        .create_folder(alice.id, None, "scratch")
        .await
        .unwrap();
    root.append_diff(StorageDiff::single(alice.id, 64));
    root.rollback().await.unwrap();

    let err = t.store().get_file(folder.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(t.user_storage(alice.id).await, 0);
}

#[tokio::test]
async fn quota_failures_are_aggregated_per_owner() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;

    let root = Tx::begin(&t.db, quota(&t)).await.unwrap();
    let mut diff = StorageDiff::single(alice.id, 12);
    diff.add(9999, 30);
    root.append_diff(diff);

    let Commit::Committed { quota_error } = root.commit().await.unwrap() else {
        panic!("root commit must be final");
    };
    let err = quota_error.expect("missing owner should be reported");
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].owner_id, 9999);
    assert_eq!(err.failures[0].delta, 30);
    assert_eq!(err.failures[0].error.kind(), ErrorKind::NotFound);

    // The healthy owner was still updated.
    assert_eq!(t.user_storage(alice.id).await, 12);
}
