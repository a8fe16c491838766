use filestore::batch::BatchLimits;
use filestore::store::FileStore;
use filestore::ErrorKind;

use crate::common::TestStore;

#[tokio::test]
async fn sibling_names_are_unique() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let bob = t.create_user("bob").await;

    let docs = t.folder(alice.id, None, "docs").await;
    t.file(alice.id, Some(docs.id), "a.txt").await;

    let err = t
        .store()
        .create_folder(alice.id, Some(docs.id), "a.txt")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

    // Root-level names clash too, but only within one owner.
    let err = t.store().create_folder(alice.id, None, "docs").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    t.folder(bob.id, None, "docs").await;
}

#[tokio::test]
async fn invalid_names_are_rejected() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;

    for name in ["", ".", "..", "a/b"] {
        let err = t.store().create_folder(alice.id, None, name).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed, "name {name:?}");
    }
}

#[tokio::test]
async fn parent_must_be_an_owned_folder() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let bob = t.create_user("bob").await;

    let file = t.file(alice.id, None, "plain.txt").await;
    let err = t
        .store()
        .create_folder(alice.id, Some(file.id), "inside")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let docs = t.folder(alice.id, None, "docs").await;
    let err = t
        .store()
        .create_folder(bob.id, Some(docs.id), "intruder")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn rename_and_move() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let docs = t.folder(alice.id, None, "docs").await;
    let a = t.file(alice.id, None, "a.txt").await;
    let b = t.file(alice.id, None, "b.txt").await;

    let err = t.store().rename(&a, "b.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    let a = t.store().rename(&a, "c.txt").await.unwrap();
    assert_eq!(a.name, "c.txt");

    let moved = t.store().move_files(&[a, b], Some(docs.id)).await.unwrap();
    assert!(moved.iter().all(|f| f.parent_id == Some(docs.id)));

    let names: Vec<String> = t
        .store()
        .children(alice.id, Some(docs.id))
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, vec!["b.txt", "c.txt"]);

    let err = t.store().move_files(&[docs.clone()], Some(docs.id)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
}

#[tokio::test]
async fn soft_delete_hides_until_restored() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let a = t.file(alice.id, None, "a").await;
    t.file(alice.id, None, "b").await;

    assert_eq!(t.store().soft_delete(&[a.id]).await.unwrap(), 1);
    let visible = t.store().children(alice.id, None).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert!(t.reload(&a).await.deleted_at.is_some());

    assert_eq!(t.store().restore(&[a.id]).await.unwrap(), 1);
    assert_eq!(t.store().children(alice.id, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn metadata_is_upserted_per_key() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let a = t.file(alice.id, None, "a").await;

    t.store().set_metadata(a.id, "color", "red", true).await.unwrap();
    let row = t.store().set_metadata(a.id, "color", "blue", false).await.unwrap();
    assert!(!row.is_public);
    t.store().set_metadata(a.id, "tag", "x", false).await.unwrap();

    let meta = t.store().metadata(a.id).await.unwrap();
    assert_eq!(meta.len(), 2);
    assert_eq!(meta["color"], "blue");
}

#[tokio::test]
async fn get_files_spans_batches() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;

    let mut ids = Vec::new();
    for i in 0..7 {
        ids.push(t.file(alice.id, None, &format!("f{i}")).await.id);
    }
    ids.push(10_000);

    let store = FileStore::with_limits(&t.db, BatchLimits::new(3, 1));
    assert_eq!(store.limits().chunk_size(1), 2);
    let files = store.get_files(&ids).await.unwrap();
    assert_eq!(files.len(), 7);
}
