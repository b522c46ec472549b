//! Tree store test functions

use estate_store_traits::{ServerValue, StoreError, TreeStore};
use serde_json::{Map, Value, json};

use super::path;

/// Whole-node writes are read back unchanged
pub async fn test_set_get_roundtrip<S>(store: S)
where
    S: TreeStore,
{
    let room = path("chatRooms/a_b");
    assert_eq!(store.get(&room).await.unwrap(), None);

    store
        .set(&room, json!({"adminId": "a", "residentId": "b"}))
        .await
        .unwrap();
    assert_eq!(
        store.get(&room).await.unwrap(),
        Some(json!({"adminId": "a", "residentId": "b"}))
    );
    assert_eq!(
        store.get(&path("chatRooms/a_b/adminId")).await.unwrap(),
        Some(json!("a"))
    );
    assert_eq!(
        store.get(&path("chatRooms")).await.unwrap(),
        Some(json!({"a_b": {"adminId": "a", "residentId": "b"}}))
    );
}

/// Writing null removes the node and empty parents
pub async fn test_null_deletes<S>(store: S)
where
    S: TreeStore,
{
    let node = path("chatRooms/r1/lastMessage");
    store.set(&node, json!("hello")).await.unwrap();
    store.set(&node, Value::Null).await.unwrap();
    assert_eq!(store.get(&node).await.unwrap(), None);
    assert_eq!(store.get(&path("chatRooms/r1")).await.unwrap(), None);
}

/// Update keys are relative paths and siblings are preserved
pub async fn test_multi_path_update<S>(store: S)
where
    S: TreeStore,
{
    let room = path("chatRooms/r1");
    store
        .set(
            &room,
            json!({
                "createdAt": 1,
                "messages": {"m1": {"read": false}, "m2": {"read": false}}
            }),
        )
        .await
        .unwrap();

    let mut fields = Map::new();
    fields.insert("messages/m1/read".to_string(), json!(true));
    fields.insert("lastMessage".to_string(), json!("hi"));
    store.update(&room, fields).await.unwrap();

    assert_eq!(
        store.get(&room).await.unwrap(),
        Some(json!({
            "createdAt": 1,
            "lastMessage": "hi",
            "messages": {"m1": {"read": true}, "m2": {"read": false}}
        }))
    );
}

/// Push ids sort in the order the pushes happened
pub async fn test_push_keys_follow_insertion_order<S>(store: S)
where
    S: TreeStore,
{
    let messages = path("chatRooms/r1/messages");
    let mut keys = Vec::new();
    for i in 0..20 {
        keys.push(store.push(&messages, json!({"n": i})).await.unwrap());
    }
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);

    let node = store.get(&messages).await.unwrap().unwrap();
    let stored: Vec<i64> = node
        .as_object()
        .unwrap()
        .values()
        .map(|v| v["n"].as_i64().unwrap())
        .collect();
    assert_eq!(stored, (0..20).collect::<Vec<i64>>());
}

/// Conditional creation writes at most once
pub async fn test_set_if_absent_creates_once<S>(store: S)
where
    S: TreeStore,
{
    let room = path("chatRooms/a_b");
    assert!(store.set_if_absent(&room, json!({"v": 1})).await.unwrap());
    assert!(!store.set_if_absent(&room, json!({"v": 2})).await.unwrap());
    assert_eq!(store.get(&room).await.unwrap(), Some(json!({"v": 1})));
}

/// Timestamp placeholders never leak into stored data
pub async fn test_server_timestamp_is_resolved<S>(store: S)
where
    S: TreeStore,
{
    let node = path("chatRooms/r1/createdAt");
    store.set(&node, ServerValue::timestamp()).await.unwrap();
    let stored = store.get(&node).await.unwrap().unwrap();
    assert!(stored.as_i64().unwrap() > 0, "got {stored}");
}

/// Subscribers get the current node, then the whole node after each change
pub async fn test_subscription_delivers_full_snapshots<S>(store: S)
where
    S: TreeStore,
{
    let messages = path("chatRooms/r1/messages");
    store.set(&path("chatRooms/r1/messages/m0"), json!({"n": 0})).await.unwrap();

    let mut sub = store.subscribe(&messages).await.unwrap();
    let first = sub.next().await.unwrap().unwrap().unwrap();
    assert_eq!(first, json!({"m0": {"n": 0}}));

    store
        .set(&path("chatRooms/r1/messages/m1"), json!({"n": 1}))
        .await
        .unwrap();
    let second = sub.next().await.unwrap().unwrap().unwrap();
    assert_eq!(second, json!({"m0": {"n": 0}, "m1": {"n": 1}}));

    // A write to the parent that replaces the subtree is also delivered.
    store
        .set(&path("chatRooms/r1"), json!({"messages": {"m9": {"n": 9}}}))
        .await
        .unwrap();
    let third = sub.next().await.unwrap().unwrap().unwrap();
    assert_eq!(third, json!({"m9": {"n": 9}}));
}

/// Releasing one subscription does not affect another on the same path
pub async fn test_unsubscribe_leaves_other_subscribers<S>(store: S)
where
    S: TreeStore,
{
    let node = path("chatRooms/r1");
    let first = store.subscribe(&node).await.unwrap();
    let mut second = store.subscribe(&node).await.unwrap();
    assert_eq!(second.next().await, Some(Ok(None)));

    first.unsubscribe();
    store.set(&path("chatRooms/r1/x"), json!(1)).await.unwrap();
    assert_eq!(second.next().await, Some(Ok(Some(json!({"x": 1})))));
}

/// Update keys go through the same path validation as everything else
pub async fn test_invalid_update_key_is_rejected<S>(store: S)
where
    S: TreeStore,
{
    let mut fields = Map::new();
    fields.insert("bad.key".to_string(), json!(1));
    let err = store.update(&path("chatRooms/r1"), fields).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidPath(_)));
    assert_eq!(store.get(&path("chatRooms/r1")).await.unwrap(), None);
}
