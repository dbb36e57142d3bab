use super::*;
use uuid::Uuid;

fn sample_user() -> User {
    User {
        id: Uuid::new_v4(),
        email: "viewer@example.com".into(),
        is_admin: false,
        profiles: vec![Profile { id: Uuid::new_v4(), name: "Ana".into(), avatar: "https://cdn/a.png".into() }],
    }
}

#[tokio::test]
async fn memory_store_save_load_remove() {
    let store = MemorySnapshotStore::new();
    assert!(store.load("k1", SESSION_RECORD).await.unwrap().is_none());

    let payload = serde_json::json!({ "isAuthenticated": false });
    store.save("k1", SESSION_RECORD, &payload).await.unwrap();
    assert_eq!(store.load("k1", SESSION_RECORD).await.unwrap(), Some(payload));
    assert_eq!(store.record_count().await, 1);

    store.remove("k1", SESSION_RECORD).await.unwrap();
    assert!(store.load("k1", SESSION_RECORD).await.unwrap().is_none());
    assert_eq!(store.record_count().await, 0);
}

#[tokio::test]
async fn memory_store_records_are_scoped_by_key_and_name() {
    let store = MemorySnapshotStore::new();
    store.save("k1", SESSION_RECORD, &serde_json::json!(1)).await.unwrap();
    store.save("k1", UPSTREAM_RECORD, &serde_json::json!(2)).await.unwrap();
    store.save("k2", SESSION_RECORD, &serde_json::json!(3)).await.unwrap();

    assert_eq!(store.load("k1", SESSION_RECORD).await.unwrap(), Some(serde_json::json!(1)));
    assert_eq!(store.load("k1", UPSTREAM_RECORD).await.unwrap(), Some(serde_json::json!(2)));
    assert_eq!(store.load("k2", SESSION_RECORD).await.unwrap(), Some(serde_json::json!(3)));
    assert!(store.load("k2", UPSTREAM_RECORD).await.unwrap().is_none());
}

#[tokio::test]
async fn memory_store_purges_only_stale_records() {
    let store = MemorySnapshotStore::new();
    store.save("old", SESSION_RECORD, &serde_json::json!(1)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    store.save("new", SESSION_RECORD, &serde_json::json!(2)).await.unwrap();

    let purged = store
        .purge_stale(std::time::Duration::from_millis(30))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert!(store.load("old", SESSION_RECORD).await.unwrap().is_none());
    assert!(store.load("new", SESSION_RECORD).await.unwrap().is_some());

    // Rewriting a record refreshes its age.
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    store.save("new", SESSION_RECORD, &serde_json::json!(3)).await.unwrap();
    assert_eq!(store.purge_stale(std::time::Duration::from_millis(30)).await.unwrap(), 0);
}

#[tokio::test]
async fn typed_records_round_trip_through_store() {
    let store = MemorySnapshotStore::new();
    let user = sample_user();
    let snapshot = SessionSnapshot {
        user: Some(user.clone()),
        is_authenticated: true,
        current_profile: Some(user.profiles[0].clone()),
        has_selected_profile: true,
    };

    save_record(&store, "k1", SESSION_RECORD, &snapshot).await.unwrap();
    let restored: SessionSnapshot = load_record(&store, "k1", SESSION_RECORD).await.unwrap().unwrap();
    assert_eq!(restored, snapshot);
}

#[tokio::test]
async fn load_record_surfaces_decode_errors() {
    let store = MemorySnapshotStore::new();
    store
        .save("k1", SESSION_RECORD, &serde_json::json!({ "user": "not-a-user" }))
        .await
        .unwrap();
    let err = load_record::<SessionSnapshot>(&store, "k1", SESSION_RECORD)
        .await
        .unwrap_err();
    assert!(matches!(err, SnapshotError::Serde(_)));
}

#[test]
fn snapshot_uses_camel_case_and_omits_transient_flags() {
    let json = serde_json::to_value(SessionSnapshot::default()).unwrap();
    let obj = json.as_object().unwrap();
    assert!(obj.contains_key("user"));
    assert!(obj.contains_key("isAuthenticated"));
    assert!(obj.contains_key("currentProfile"));
    assert!(obj.contains_key("hasSelectedProfile"));
    assert!(!obj.contains_key("isLoading"));
    assert!(!obj.contains_key("error"));
    assert_eq!(obj.len(), 4);
}

#[test]
fn snapshot_missing_fields_default() {
    let snapshot: SessionSnapshot = serde_json::from_str("{}").unwrap();
    assert_eq!(snapshot, SessionSnapshot::default());
}
