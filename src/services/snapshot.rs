//! Durable storage for the persisted subset of session state.
//!
//! DESIGN
//! ======
//! Each browser session key owns a small set of named JSON records, the same
//! way a browser keeps named entries in local storage. `auth-storage` holds the
//! `SessionSnapshot` (user, profile selection, and their flags) and
//! `upstream-session` holds the upstream token pair. Loading/error flags are
//! never written, so every rehydrated session starts neutral.
//!
//! Postgres is the durable backing store; the in-memory store is used by tests
//! and when no database is configured. Records not written within the
//! remember-me horizon are purged by the registry sweep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;

use crate::models::{Profile, User};

/// Record holding the persisted session snapshot.
pub const SESSION_RECORD: &str = "auth-storage";
/// Record holding the upstream access/refresh token pair.
pub const UPSTREAM_RECORD: &str = "upstream-session";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("snapshot encode/decode failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The part of session state that survives a restart.
///
/// The two flags are written for readers of the raw record; on rehydration
/// they are recomputed from `user` and `current_profile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default)]
    pub current_profile: Option<Profile>,
    #[serde(default)]
    pub has_selected_profile: bool,
}

// =============================================================================
// STORE TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self, session_key: &str, name: &str) -> Result<Option<serde_json::Value>, SnapshotError>;

    async fn save(&self, session_key: &str, name: &str, payload: &serde_json::Value) -> Result<(), SnapshotError>;

    async fn remove(&self, session_key: &str, name: &str) -> Result<(), SnapshotError>;

    /// Delete every record last written more than `max_age` ago. Returns the
    /// number of records removed.
    async fn purge_stale(&self, max_age: Duration) -> Result<u64, SnapshotError>;
}

/// Load and decode a named record.
pub async fn load_record<T: DeserializeOwned>(
    store: &dyn SnapshotStore,
    session_key: &str,
    name: &str,
) -> Result<Option<T>, SnapshotError> {
    match store.load(session_key, name).await? {
        Some(payload) => Ok(Some(serde_json::from_value(payload)?)),
        None => Ok(None),
    }
}

/// Encode and write a named record.
pub async fn save_record<T: Serialize + Sync>(
    store: &dyn SnapshotStore,
    session_key: &str,
    name: &str,
    value: &T,
) -> Result<(), SnapshotError> {
    let payload = serde_json::to_value(value)?;
    store.save(session_key, name, &payload).await
}

// =============================================================================
// POSTGRES
// =============================================================================

pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn load(&self, session_key: &str, name: &str) -> Result<Option<serde_json::Value>, SnapshotError> {
        let row = sqlx::query("SELECT payload FROM session_records WHERE session_key = $1 AND name = $2")
            .bind(session_key)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(r.try_get::<serde_json::Value, _>("payload")?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session_key: &str, name: &str, payload: &serde_json::Value) -> Result<(), SnapshotError> {
        sqlx::query(
            r"INSERT INTO session_records (session_key, name, payload)
              VALUES ($1, $2, $3)
              ON CONFLICT (session_key, name) DO UPDATE SET payload = EXCLUDED.payload, updated_at = now()",
        )
        .bind(session_key)
        .bind(name)
        .bind(sqlx::types::Json(payload))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, session_key: &str, name: &str) -> Result<(), SnapshotError> {
        sqlx::query("DELETE FROM session_records WHERE session_key = $1 AND name = $2")
            .bind(session_key)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_stale(&self, max_age: Duration) -> Result<u64, SnapshotError> {
        let result = sqlx::query("DELETE FROM session_records WHERE updated_at < now() - make_interval(secs => $1)")
            .bind(max_age.as_secs_f64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

#[derive(Default)]
pub struct MemorySnapshotStore {
    records: RwLock<HashMap<(String, String), (serde_json::Value, Instant)>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all session keys.
    #[cfg(test)]
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self, session_key: &str, name: &str) -> Result<Option<serde_json::Value>, SnapshotError> {
        let records = self.records.read().await;
        Ok(records
            .get(&(session_key.to_owned(), name.to_owned()))
            .map(|(payload, _)| payload.clone()))
    }

    async fn save(&self, session_key: &str, name: &str, payload: &serde_json::Value) -> Result<(), SnapshotError> {
        let mut records = self.records.write().await;
        records.insert((session_key.to_owned(), name.to_owned()), (payload.clone(), Instant::now()));
        Ok(())
    }

    async fn remove(&self, session_key: &str, name: &str) -> Result<(), SnapshotError> {
        let mut records = self.records.write().await;
        records.remove(&(session_key.to_owned(), name.to_owned()));
        Ok(())
    }

    async fn purge_stale(&self, max_age: Duration) -> Result<u64, SnapshotError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, (_, written)| written.elapsed() <= max_age);
        Ok(u64::try_from(before - records.len()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;
