use filestore::batch::BatchLimits;
use filestore::entity::blob::RecycleOptions;
use filestore::entity::{direct_link, metadata, share};
use filestore::store::FileStore;
use filestore::ErrorKind;
use sea_orm::{EntityTrait, PaginatorTrait};

use crate::common::TestStore;

fn recycle() -> RecycleOptions {
    RecycleOptions {
        unlink_only: false,
        reason: "delete".into(),
    }
}

#[tokio::test]
async fn deleting_sole_owner_orphans_entity() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let policy = t.create_policy("local", 0).await;
    let file = t.file(alice.id, None, "a.txt").await;
    let entity = t.attach(&file, policy.id, "a.txt", 42).await;

    t.store().set_metadata(file.id, "k", "v", false).await.unwrap();
    t.store().create_share(&file, alice.id).await.unwrap();
    t.store().create_direct_link(&file, "a.txt").await.unwrap();

    let (orphaned, diff) = t.store().delete(&[file.clone()], recycle()).await.unwrap();

    assert_eq!(orphaned.len(), 1);
    assert_eq!(orphaned[0].id, entity.id);
    assert_eq!(orphaned[0].recycle_options, Some(recycle()));
    assert_eq!(diff.get(alice.id), -42);
    assert_eq!(diff.len(), 1);

    let stored = t.entity(entity.id).await;
    assert_eq!(stored.reference_count, 0);
    assert!(stored.is_stale());

    let err = t.store().get_file(file.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(metadata::Entity::find().count(&t.db).await.unwrap(), 0);
    assert_eq!(share::Entity::find().count(&t.db).await.unwrap(), 0);
    assert_eq!(direct_link::Entity::find().count(&t.db).await.unwrap(), 0);
}

#[tokio::test]
async fn shared_entity_survives_partial_delete() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let bob = t.create_user("bob").await;
    let policy = t.create_policy("local", 0).await;

    let a = t.file(alice.id, None, "a").await;
    let b = t.file(bob.id, None, "b").await;
    let entity = t.attach(&a, policy.id, "shared", 8).await;
    t.attach(&b, policy.id, "shared", 8).await;

    let (orphaned, diff) = t.store().delete(&[a], recycle()).await.unwrap();
    assert!(orphaned.is_empty());
    assert_eq!(diff.get(alice.id), -8);
    assert_eq!(diff.get(bob.id), 0);

    let stored = t.entity(entity.id).await;
    assert_eq!(stored.reference_count, 1);
    assert_eq!(stored.recycle_options, None);
}

#[tokio::test]
async fn one_entity_attached_to_several_deleted_files() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let policy = t.create_policy("local", 0).await;

    let a = t.file(alice.id, None, "a").await;
    let b = t.file(alice.id, None, "b").await;
    let c = t.file(alice.id, None, "c").await;
    let shared = t.attach(&a, policy.id, "shared", 5).await;
    t.attach(&b, policy.id, "shared", 5).await;
    let own = t.attach(&c, policy.id, "own", 3).await;

    let (orphaned, diff) = t.store().delete(&[a, b, c], recycle()).await.unwrap();

    let ids: Vec<i32> = orphaned.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![shared.id, own.id]);
    assert_eq!(diff.get(alice.id), -13);
    assert_eq!(t.entity(shared.id).await.reference_count, 0);
}

#[tokio::test]
async fn delete_works_across_batches() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let policy = t.create_policy("local", 0).await;

    let mut files = Vec::new();
    for i in 0..5 {
        let f = t.file(alice.id, None, &format!("f{i}")).await;
        t.attach(&f, policy.id, &format!("s{i}"), 1).await;
        files.push(f);
    }

    let store = FileStore::with_limits(&t.db, BatchLimits::new(3, 1));
    let (orphaned, diff) = store.delete(&files, recycle()).await.unwrap();
    assert_eq!(orphaned.len(), 5);
    assert_eq!(diff.get(alice.id), -5);
    assert!(t.store().children(alice.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_nothing_is_a_no_op() {
    let t = TestStore::spawn().await;
    let (orphaned, diff) = t.store().delete(&[], recycle()).await.unwrap();
    assert!(orphaned.is_empty());
    assert!(diff.is_empty());
}
