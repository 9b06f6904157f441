use std::sync::Arc;

use serde_json::{json, Value};

use vimo_backend::sessions::{OrderOperation, SessionError, SessionStore};

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

async fn listed(store: &SessionStore) -> Vec<String> {
    store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|summary| summary.id)
        .collect()
}

fn order_on_disk(store_dir: &std::path::Path) -> Vec<String> {
    let raw = std::fs::read(store_dir.join("chat-sessions").join("order.json")).unwrap();
    let value: Value = serde_json::from_slice(&raw).unwrap();
    serde_json::from_value(value["order"].clone()).unwrap()
}

#[tokio::test]
async fn test_reorder_then_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::with_store_directory(dir.path());

    for id in ["a", "b", "c"] {
        store.save(id, json!({ "title": id.to_uppercase() })).await.unwrap();
    }
    assert_eq!(listed(&store).await, ids(&["a", "b", "c"]));

    let order = store
        .update_order(ids(&["c", "a", "b"]), OrderOperation::Reorder)
        .await
        .unwrap();
    assert_eq!(order, ids(&["c", "a", "b"]));

    let summaries = store.list().await.unwrap();
    let shown: Vec<(String, u32, Option<String>)> = summaries
        .into_iter()
        .map(|s| (s.id, s.order_index, s.title))
        .collect();
    assert_eq!(
        shown,
        vec![
            ("c".to_string(), 0, Some("C".to_string())),
            ("a".to_string(), 1, Some("A".to_string())),
            ("b".to_string(), 2, Some("B".to_string())),
        ]
    );

    store.delete("a").await.unwrap();
    assert_eq!(listed(&store).await, ids(&["c", "b"]));
    assert_eq!(order_on_disk(dir.path()), ids(&["c", "b"]));
    assert_eq!(
        store.load("a").await,
        Err(SessionError::NotFound("a".to_string()))
    );
}

#[tokio::test]
async fn test_save_replaces_without_moving() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::with_store_directory(dir.path());

    store.save("a", json!({ "messages": [] })).await.unwrap();
    store.save("b", json!({ "messages": [] })).await.unwrap();
    store.save("a", json!({ "messages": ["hi"] })).await.unwrap();

    assert_eq!(listed(&store).await, ids(&["a", "b"]));
    assert_eq!(store.load("a").await.unwrap(), json!({ "messages": ["hi"] }));
}

#[tokio::test]
async fn test_list_heals_missing_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::with_store_directory(dir.path());

    for id in ["a", "b", "c"] {
        store.save(id, json!({})).await.unwrap();
    }

    // Record removed behind the store's back
    std::fs::remove_file(dir.path().join("chat-sessions/sessions/b.json")).unwrap();

    assert_eq!(listed(&store).await, ids(&["a", "c"]));
    assert_eq!(order_on_disk(dir.path()), ids(&["a", "c"]), "healed order is persisted");
}

#[tokio::test]
async fn test_list_appends_orphaned_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::with_store_directory(dir.path());

    store.save("a", json!({})).await.unwrap();
    store.save("b", json!({})).await.unwrap();

    // Order list lost track of "a"
    std::fs::write(
        dir.path().join("chat-sessions/order.json"),
        br#"{"order": ["b"]}"#,
    )
    .unwrap();

    assert_eq!(listed(&store).await, ids(&["b", "a"]));
}

#[tokio::test]
async fn test_corrupt_order_file_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::with_store_directory(dir.path());

    store.save("a", json!({})).await.unwrap();
    std::fs::write(dir.path().join("chat-sessions/order.json"), b"{not json").unwrap();

    assert_eq!(listed(&store).await, ids(&["a"]));
    assert_eq!(order_on_disk(dir.path()), ids(&["a"]));
}

#[tokio::test]
async fn test_concurrent_saves_of_different_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SessionStore::with_store_directory(dir.path()));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .save(&format!("chat-{}", i), json!({ "n": i }))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut all = listed(&store).await;
    assert_eq!(all.len(), 16, "no order entry is lost");
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 16);

    for i in 0..16 {
        assert_eq!(
            store.load(&format!("chat-{}", i)).await.unwrap(),
            json!({ "n": i })
        );
    }
}

#[tokio::test]
async fn test_update_order_validation() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::with_store_directory(dir.path());

    store.save("a", json!({})).await.unwrap();
    store.save("b", json!({})).await.unwrap();

    let test_cases = vec![
        (
            "create unknown",
            ids(&["ghost"]),
            OrderOperation::Create,
            Err(SessionError::UnknownIds(ids(&["ghost"]))),
        ),
        ("create listed", ids(&["a"]), OrderOperation::Create, Ok(ids(&["a", "b"]))),
        (
            "reorder subset",
            ids(&["b"]),
            OrderOperation::Reorder,
            Err(SessionError::NotAPermutation),
        ),
        (
            "invalid id",
            ids(&["../etc"]),
            OrderOperation::Reorder,
            Err(SessionError::InvalidId("../etc".to_string())),
        ),
        ("reorder", ids(&["b", "a"]), OrderOperation::Reorder, Ok(ids(&["b", "a"]))),
    ];

    for (description, requested, operation, expected) in test_cases {
        assert_eq!(
            store.update_order(requested, operation).await,
            expected,
            "{}",
            description
        );
    }
}

#[tokio::test]
async fn test_update_order_delete_keeps_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::with_store_directory(dir.path());

    store.save("a", json!({ "keep": true })).await.unwrap();
    let order = store
        .update_order(ids(&["a"]), OrderOperation::Delete)
        .await
        .unwrap();
    assert!(order.is_empty());

    // Still on disk, so the next listing re-appends it
    assert_eq!(store.load("a").await.unwrap(), json!({ "keep": true }));
    assert_eq!(listed(&store).await, ids(&["a"]));
}

#[tokio::test]
async fn test_delete_unknown_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::with_store_directory(dir.path());

    assert_eq!(
        store.delete("nope").await,
        Err(SessionError::NotFound("nope".to_string()))
    );
}
