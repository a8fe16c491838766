use std::collections::HashMap;

use filestore::entity::blob::RecycleOptions;
use filestore::ErrorKind;

use crate::common::TestStore;

#[tokio::test]
async fn copy_then_delete_copy_is_neutral() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let policy = t.create_policy("local", 0).await;
    let src = t.folder(alice.id, None, "src").await;
    let dst = t.folder(alice.id, None, "dst").await;
    let file = t.file(alice.id, Some(src.id), "a.txt").await;
    let entity = t.attach(&file, policy.id, "a.txt", 30).await;
    let file = t.reload(&file).await;

    let destinations = HashMap::from([(Some(src.id), dst.clone())]);
    let (copies, diff) = t.store().copy(&[file.clone()], &destinations).await.unwrap();

    let copied = &copies[&file.id];
    assert_eq!(copied.parent_id, Some(dst.id));
    assert_eq!(copied.name, "a.txt");
    assert_eq!(copied.size, 30);
    assert_eq!(copied.primary_entity_id, Some(entity.id));
    assert_eq!(diff.get(alice.id), 30);
    assert_eq!(t.entity(entity.id).await.reference_count, 2);

    let (orphaned, diff) = t
        .store()
        .delete(&[copied.clone()], RecycleOptions::default())
        .await
        .unwrap();
    assert!(orphaned.is_empty());
    assert_eq!(diff.get(alice.id), -30);
    assert_eq!(t.entity(entity.id).await.reference_count, 1);
}

#[tokio::test]
async fn copy_recreates_folder_tree_and_metadata() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let bob = t.create_user("bob").await;
    let policy = t.create_policy("local", 0).await;

    let album = t.folder(alice.id, None, "album").await;
    let inner = t.folder(alice.id, Some(album.id), "2024").await;
    let photo = t.file(alice.id, Some(inner.id), "beach.jpg").await;
    t.attach(&photo, policy.id, "p/beach.jpg", 500).await;
    t.store().set_metadata(photo.id, "camera", "x100", true).await.unwrap();

    let target = t.folder(bob.id, None, "shared").await;
    let destinations = HashMap::from([(Some(album.id), target.clone())]);
    let (copies, diff) = t
        .store()
        .copy(&[inner.clone(), photo.clone()], &destinations)
        .await
        .unwrap();

    let inner_copy = &copies[&inner.id];
    let photo_copy = &copies[&photo.id];
    assert_eq!(inner_copy.owner_id, bob.id);
    assert_eq!(inner_copy.parent_id, Some(target.id));
    assert_eq!(photo_copy.parent_id, Some(inner_copy.id));

    // The destination owner pays for the copied bytes.
    assert_eq!(diff.get(bob.id), 500);
    assert_eq!(diff.get(alice.id), 0);

    let meta = t.store().metadata(photo_copy.id).await.unwrap();
    assert_eq!(meta.get("camera").map(String::as_str), Some("x100"));
}

#[tokio::test]
async fn placeholders_are_not_copied() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let policy = t.create_policy("local", 0).await;
    let dst = t.folder(alice.id, None, "dst").await;
    let file = t.file(alice.id, None, "upload.bin").await;
    let (pending, _) = t
        .store()
        .create_entity(
            &file,
            filestore::EntityParams {
                upload_session_id: Some("s".into()),
                ..crate::common::version(policy.id, "u/upload.bin", 9)
            },
        )
        .await
        .unwrap();

    let destinations = HashMap::from([(None, dst.clone())]);
    let (copies, diff) = t.store().copy(&[file.clone()], &destinations).await.unwrap();

    assert!(diff.is_empty());
    assert!(t.store().file_entities(copies[&file.id].id, None).await.unwrap().is_empty());
    assert_eq!(t.entity(pending.id).await.reference_count, 1);
}

#[tokio::test]
async fn copy_without_destination_fails() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let file = t.file(alice.id, None, "a").await;

    let err = t.store().copy(&[file], &HashMap::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
