use super::*;
use crate::backend::mock::MockBackend;
use crate::services::snapshot::{self, MemorySnapshotStore, SESSION_RECORD, SessionSnapshot, UPSTREAM_RECORD};

const IDLE_TTL: Duration = Duration::from_secs(60);

fn registry() -> (SessionRegistry, Arc<MockBackend>, Arc<MemorySnapshotStore>) {
    let backend = Arc::new(MockBackend::new());
    let store = Arc::new(MemorySnapshotStore::new());
    (SessionRegistry::new(backend.clone(), store.clone(), IDLE_TTL), backend, store)
}

#[test]
fn generated_keys_are_valid_and_distinct() {
    let a = generate_session_key();
    let b = generate_session_key();
    assert!(is_valid_session_key(&a));
    assert!(is_valid_session_key(&b));
    assert_ne!(a, b);
}

#[test]
fn key_validation_rejects_bad_shapes() {
    assert!(!is_valid_session_key(""));
    assert!(!is_valid_session_key("abc"));
    assert!(!is_valid_session_key(&"A".repeat(64)));
    assert!(!is_valid_session_key(&"g".repeat(64)));
    assert!(!is_valid_session_key(&"a".repeat(65)));
    assert!(is_valid_session_key(&"0f".repeat(32)));
}

#[test]
fn bytes_to_hex_pads() {
    assert_eq!(bytes_to_hex(&[0x00, 0x0a, 0xff]), "000aff");
    assert_eq!(bytes_to_hex(&[]), "");
}

#[tokio::test]
async fn open_without_key_issues_new_session() {
    let (registry, _, _) = registry();
    let (ctx, issued) = registry.open(None).await;
    assert!(issued);
    assert!(is_valid_session_key(ctx.key()));
    assert_eq!(registry.live_count().await, 1);
}

#[tokio::test]
async fn open_with_invalid_key_issues_new_session() {
    let (registry, _, _) = registry();
    let (ctx, issued) = registry.open(Some("not-a-key")).await;
    assert!(issued);
    assert_ne!(ctx.key(), "not-a-key");
}

#[tokio::test]
async fn open_same_key_returns_same_context() {
    let (registry, _, _) = registry();
    let (first, _) = registry.open(None).await;
    let (second, issued) = registry.open(Some(first.key())).await;
    assert!(!issued);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.live_count().await, 1);
}

#[tokio::test]
async fn sessions_are_isolated() {
    let (registry, backend, _) = registry();
    backend.add_account("admin@example.com", "secret1", true, Vec::new());

    let (a, _) = registry.open(None).await;
    let (b, _) = registry.open(None).await;
    a.login("admin@example.com", "secret1").await;

    assert!(a.view().await.is_authenticated);
    assert!(!b.view().await.is_authenticated);
}

#[tokio::test]
async fn unknown_valid_key_is_rehydrated_from_store() {
    let (registry, _, store) = registry();
    let key = generate_session_key();
    let user = crate::models::User { id: uuid::Uuid::new_v4(), email: "v@example.com".into(), is_admin: false, profiles: Vec::new() };
    let snap = SessionSnapshot { user: Some(user.clone()), is_authenticated: true, current_profile: None, has_selected_profile: false };
    snapshot::save_record(store.as_ref(), &key, SESSION_RECORD, &snap)
        .await
        .unwrap();

    let (ctx, issued) = registry.open(Some(&key)).await;
    assert!(!issued);
    assert_eq!(ctx.key(), key);
    let view = ctx.view().await;
    assert!(view.is_authenticated);
    assert_eq!(view.user, Some(user));
    assert_eq!(registry.live_count().await, 1);

    let (again, _) = registry.open(Some(&key)).await;
    assert!(Arc::ptr_eq(&ctx, &again));
}

#[tokio::test]
async fn unknown_valid_key_without_record_is_replaced() {
    let (registry, _, _) = registry();
    let planted = "ab".repeat(32);

    let (ctx, issued) = registry.open(Some(&planted)).await;
    assert!(issued);
    assert_ne!(ctx.key(), planted);
    assert!(is_valid_session_key(ctx.key()));
    assert_eq!(registry.live_count().await, 1);
}

#[tokio::test]
async fn rotate_after_login_retires_the_pre_login_key() {
    let (registry, backend, store) = registry();
    backend.add_account("victim@example.com", "secret1", false, Vec::new());

    // A key handed out to one browser and planted in another.
    let (ctx, _) = registry.open(None).await;
    let planted = ctx.key().to_owned();
    assert!(ctx.login("victim@example.com", "secret1").await.is_authenticated);

    let rotated = registry.rotate(&ctx).await;
    assert_ne!(rotated.key(), planted);
    assert!(rotated.view().await.is_authenticated);
    assert_eq!(registry.live_count().await, 1);

    let (stale, issued) = registry.open(Some(&planted)).await;
    assert!(issued);
    assert_ne!(stale.key(), planted);
    assert!(!stale.view().await.is_authenticated);
    assert!(store.load(&planted, SESSION_RECORD).await.unwrap().is_none());
    assert!(store.load(&planted, UPSTREAM_RECORD).await.unwrap().is_none());

    let (current, issued) = registry.open(Some(rotated.key())).await;
    assert!(!issued);
    assert!(Arc::ptr_eq(&current, &rotated));
}

#[tokio::test]
async fn idle_contexts_are_evicted() {
    let (registry, _, _) = registry();
    for _ in 0..3 {
        registry.open(None).await;
    }

    assert_eq!(registry.evict_idle_at(Instant::now() + IDLE_TTL / 2).await, 0);
    assert_eq!(registry.live_count().await, 3);

    let later = Instant::now() + IDLE_TTL + Duration::from_secs(1);
    assert_eq!(registry.evict_idle_at(later).await, 3);
    assert_eq!(registry.live_count().await, 0);
}

#[tokio::test]
async fn recent_access_keeps_a_context_alive() {
    let backend = Arc::new(MockBackend::new());
    let store = Arc::new(MemorySnapshotStore::new());
    let registry = SessionRegistry::new(backend, store, Duration::from_millis(10));
    let (kept, _) = registry.open(None).await;
    registry.open(None).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    let touched_at = Instant::now();
    registry.open(Some(kept.key())).await;

    assert_eq!(registry.evict_idle_at(touched_at + Duration::from_millis(5)).await, 1);
    let (again, issued) = registry.open(Some(kept.key())).await;
    assert!(!issued);
    assert!(Arc::ptr_eq(&again, &kept));
}

#[tokio::test]
async fn evicted_signed_in_session_rehydrates() {
    let (registry, backend, _) = registry();
    backend.add_account("viewer@example.com", "secret1", false, Vec::new());
    let (ctx, _) = registry.open(None).await;
    ctx.login("viewer@example.com", "secret1").await;
    let key = ctx.key().to_owned();

    registry
        .evict_idle_at(Instant::now() + IDLE_TTL * 2)
        .await;
    assert_eq!(registry.live_count().await, 0);

    let (restored, issued) = registry.open(Some(&key)).await;
    assert!(!issued);
    assert!(!Arc::ptr_eq(&restored, &ctx));
    assert!(restored.view().await.is_authenticated);
}

#[tokio::test]
async fn sweep_evicts_and_purges_stale_records() {
    let backend = Arc::new(MockBackend::new());
    let store = Arc::new(MemorySnapshotStore::new());
    let registry = SessionRegistry::new(backend.clone(), store.clone(), Duration::ZERO);
    backend.add_account("viewer@example.com", "secret1", false, Vec::new());

    let (ctx, _) = registry.open(None).await;
    ctx.login("viewer@example.com", "secret1").await;
    for _ in 0..10 {
        registry.open(None).await;
    }
    assert_eq!(registry.live_count().await, 11);
    assert_eq!(store.record_count().await, 2);

    tokio::time::sleep(Duration::from_millis(20)).await;
    registry.sweep(Duration::from_millis(5)).await;
    assert_eq!(registry.live_count().await, 0);
    assert_eq!(store.record_count().await, 0);

    // Nothing left to rehydrate: the old key is replaced.
    let (_, issued) = registry.open(Some(ctx.key())).await;
    assert!(issued);
}
