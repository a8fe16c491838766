use std::collections::HashMap;

use filestore::entity::blob::RecycleOptions;
use filestore::entity::user;
use filestore::quota::{calculate_storage, recalculate_all};
use filestore::store::FileStore;
use filestore::Tx;
use sea_orm::{ActiveModelTrait, Set};

use crate::common::{TestStore, version};

#[tokio::test]
async fn incremental_usage_matches_recomputation() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let policy = t.create_policy("local", 0).await;
    let backup = t.folder(alice.id, None, "backup").await;
    let f1 = t.file(alice.id, None, "one").await;
    let f2 = t.file(alice.id, None, "two").await;
    let f3 = t.file(alice.id, None, "three").await;

    let tx = Tx::begin(&t.db, t.quota.clone()).await.unwrap();
    {
        let store = FileStore::new(tx.conn());

        let (_, d) = store.create_entity(&f1, version(policy.id, "x", 10)).await.unwrap();
        tx.append_diff(d);
        let (_, d) = store.create_entity(&f2, version(policy.id, "y", 20)).await.unwrap();
        tx.append_diff(d);
        for i in 0..4 {
            let (_, d) = store
                .create_entity(&f3, version(policy.id, &format!("z{i}"), 100))
                .await
                .unwrap();
            tx.append_diff(d);
        }

        let f1 = store.get_file(f1.id).await.unwrap();
        let destinations = HashMap::from([(None, backup.clone())]);
        let (_, d) = store.copy(&[f1], &destinations).await.unwrap();
        tx.append_diff(d);

        let f2 = store.get_file(f2.id).await.unwrap();
        let (_, d) = store.delete(&[f2], RecycleOptions::default()).await.unwrap();
        tx.append_diff(d);

        let f3 = store.get_file(f3.id).await.unwrap();
        let d = store
            .cap_entities(&f3, alice.id, 1, common::EntityType::Version)
            .await
            .unwrap();
        tx.append_diff(d);
    }
    assert!(tx.commit().await.unwrap().is_committed());

    let recomputed = calculate_storage(&t.db, alice.id).await.unwrap();
    assert_eq!(recomputed, 10 + 10 + 100);
    assert_eq!(t.user_storage(alice.id).await, recomputed);
    assert!(recalculate_all(&t.db).await.unwrap().is_empty());
}

#[tokio::test]
async fn recalculation_corrects_drift() {
    let t = TestStore::spawn().await;
    let alice = t.create_user("alice").await;
    let policy = t.create_policy("local", 0).await;
    let file = t.file(alice.id, None, "a").await;
    t.attach(&file, policy.id, "a", 64).await;

    let mut active: user::ActiveModel = alice.clone().into();
    active.storage = Set(999);
    active.update(&t.db).await.unwrap();

    let corrected = recalculate_all(&t.db).await.unwrap();
    assert_eq!(corrected, vec![(alice.id, 999, 64)]);
    assert_eq!(t.user_storage(alice.id).await, 64);
}
