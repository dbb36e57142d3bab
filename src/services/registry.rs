//! Session registry: maps browser session keys to live session contexts.
//!
//! ARCHITECTURE
//! ============
//! Browsers carry an opaque 32-byte hex key in a cookie. Only keys this server
//! issued are honoured: a key is adopted when its context is live in memory or
//! its `auth-storage` record exists (e.g. after a restart or an idle eviction).
//! Any other key, well-formed or not, gets a freshly generated one.
//!
//! Sign-in rotates the key (`rotate`), so a key planted in a browser before
//! login never resolves to the signed-in user.
//!
//! LIFETIME
//! ========
//! Contexts idle longer than the configured TTL are dropped from memory by the
//! periodic sweep, which also purges stored records past the remember-me horizon.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::info;

use crate::backend::Backend;
use crate::services::session::{SessionContext, short_key};
use crate::services::snapshot::{SESSION_RECORD, SnapshotStore};

const SESSION_KEY_BYTES: usize = 32;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex session key.
#[must_use]
pub fn generate_session_key() -> String {
    let bytes: [u8; SESSION_KEY_BYTES] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Keys we issue are exactly 64 lowercase hex chars; anything else is ignored.
#[must_use]
pub fn is_valid_session_key(key: &str) -> bool {
    key.len() == SESSION_KEY_BYTES * 2
        && key
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

struct Entry {
    ctx: Arc<SessionContext>,
    last_seen: Instant,
}

impl Entry {
    fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx, last_seen: Instant::now() }
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Entry>>,
    backend: Arc<dyn Backend>,
    store: Arc<dyn SnapshotStore>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, store: Arc<dyn SnapshotStore>, idle_ttl: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), backend, store, idle_ttl }
    }

    /// Resolve the context for `key`, rehydrating or creating as needed.
    /// The flag is `true` when a new key was issued and must be sent back.
    pub async fn open(&self, key: Option<&str>) -> (Arc<SessionContext>, bool) {
        if let Some(key) = key.filter(|k| is_valid_session_key(k)) {
            if let Some(ctx) = self.touch(key).await {
                return (ctx, false);
            }

            if self.has_stored_session(key).await {
                let restored =
                    Arc::new(SessionContext::rehydrate(key.to_owned(), Arc::clone(&self.backend), Arc::clone(&self.store)).await);
                let mut sessions = self.sessions.write().await;
                // Another request may have rehydrated the same key meanwhile.
                let entry = sessions
                    .entry(key.to_owned())
                    .or_insert_with(|| Entry::new(restored));
                entry.last_seen = Instant::now();
                return (Arc::clone(&entry.ctx), false);
            }
            tracing::debug!(session = %short_key(key), "unknown session key; issuing a new one");
        }

        (self.insert_fresh().await, true)
    }

    /// Re-key a session after sign-in. The returned context holds the
    /// identity; the old key is forgotten and its stored records deleted.
    pub async fn rotate(&self, ctx: &Arc<SessionContext>) -> Arc<SessionContext> {
        let new_key = generate_session_key();
        let moved = Arc::new(ctx.transfer_to(new_key.clone()).await);

        let mut sessions = self.sessions.write().await;
        sessions.remove(ctx.key());
        sessions.insert(new_key, Entry::new(Arc::clone(&moved)));
        moved
    }

    /// Number of contexts currently held in memory.
    pub async fn live_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop contexts idle longer than the TTL. Returns how many were dropped.
    pub async fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now()).await
    }

    async fn evict_idle_at(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now.saturating_duration_since(entry.last_seen) < self.idle_ttl);
        before - sessions.len()
    }

    /// One sweep pass: evict idle contexts, then purge stale stored records.
    pub async fn sweep(&self, record_max_age: Duration) {
        let evicted = self.evict_idle().await;
        match self.store.purge_stale(record_max_age).await {
            Ok(purged) => {
                if evicted > 0 || purged > 0 {
                    let live = self.live_count().await;
                    info!(evicted, purged, live, "session sweep");
                }
            }
            Err(e) => tracing::warn!(error = %e, evicted, "session record purge failed"),
        }
    }

    async fn touch(&self, key: &str) -> Option<Arc<SessionContext>> {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(key).map(|entry| {
            entry.last_seen = Instant::now();
            Arc::clone(&entry.ctx)
        })
    }

    async fn has_stored_session(&self, key: &str) -> bool {
        match self.store.load(key, SESSION_RECORD).await {
            Ok(record) => record.is_some(),
            Err(e) => {
                tracing::warn!(session = %short_key(key), error = %e, "session record lookup failed");
                false
            }
        }
    }

    async fn insert_fresh(&self) -> Arc<SessionContext> {
        let key = generate_session_key();
        let ctx = Arc::new(SessionContext::new(key.clone(), Arc::clone(&self.backend), Arc::clone(&self.store)));
        self.sessions
            .write()
            .await
            .insert(key, Entry::new(Arc::clone(&ctx)));
        tracing::debug!("issued new session key");
        ctx
    }
}

/// Spawn the periodic session sweep. Returns a handle for shutdown.
pub fn spawn_sweeper(registry: Arc<SessionRegistry>, every: Duration, record_max_age: Duration) -> JoinHandle<()> {
    info!(
        every_secs = every.as_secs(),
        idle_ttl_secs = registry.idle_ttl.as_secs(),
        record_max_age_secs = record_max_age.as_secs(),
        "session sweep configured"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            registry.sweep(record_max_age).await;
        }
    })
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
