//! Backend gateway: the hosted auth, table and object-storage service.
//!
//! DESIGN
//! ======
//! Everything non-trivial (credential checks, token issuance, reset emails,
//! row persistence, public file URLs) happens upstream. The `Backend` trait is
//! the seam the session container talks through; `SupabaseBackend` is the
//! production HTTP implementation and tests substitute an in-process mock.

#[cfg(test)]
pub mod mock;
pub mod supabase;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use supabase::SupabaseBackend;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by backend gateway calls.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BackendError {
    /// The request never produced a response (DNS, connect, timeout, TLS).
    #[error("upstream unreachable: {0}")]
    Transport(String),

    /// The upstream answered with a non-success status.
    #[error("upstream rejected request ({status}): {message}")]
    Rejected {
        status: u16,
        /// Upstream machine-readable code when present (e.g. `invalid_credentials`).
        code: Option<String>,
        /// Human-readable upstream message.
        message: String,
    },

    /// The upstream response body did not have the expected shape.
    #[error("upstream response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl BackendError {
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Stable code for structured logs.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_UPSTREAM_TRANSPORT",
            Self::Rejected { .. } => "E_UPSTREAM_REJECTED",
            Self::Parse(_) => "E_UPSTREAM_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }
}

// =============================================================================
// WIRE SHAPES
// =============================================================================

/// Upstream session token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of a successful sign-in or sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub email: String,
    /// Absent after sign-up when the project requires email confirmation.
    pub tokens: Option<UpstreamTokens>,
}

/// A `profiles` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// A `users` row joined with its child `profiles` rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub profiles: Vec<ProfileRecord>,
}

/// Partial update of a profile row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "avatar_url", alias = "avatar", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl ProfilePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.avatar.is_none()
    }
}

/// Row written by the profile upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// One of the default avatar choices offered in the profile editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarOption {
    pub id: Uuid,
    pub url: String,
    pub category: String,
}

// =============================================================================
// TRAIT
// =============================================================================

/// Gateway to the hosted backend. Tokens are the caller's upstream access
/// token; `None` means the anon key alone is used.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;

    async fn request_password_reset(&self, email: &str) -> Result<(), BackendError>;

    async fn update_password(&self, access_token: &str, new_password: &str) -> Result<(), BackendError>;

    /// Read a user row with its profiles. `Ok(None)` when no row matches.
    async fn fetch_user(&self, user_id: Uuid, access_token: Option<&str>) -> Result<Option<UserRecord>, BackendError>;

    /// Update a profile row. `Ok(None)` when no row was updated.
    async fn update_profile(
        &self,
        profile_id: Uuid,
        patch: &ProfilePatch,
        access_token: Option<&str>,
    ) -> Result<Option<ProfileRecord>, BackendError>;

    async fn upsert_profile(&self, profile: &NewProfile, access_token: Option<&str>)
    -> Result<ProfileRecord, BackendError>;

    async fn list_avatars(&self, category: Option<&str>) -> Result<Vec<AvatarOption>, BackendError>;

    async fn upload_object(
        &self,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
        access_token: Option<&str>,
    ) -> Result<(), BackendError>;

    /// Public URL for an object previously uploaded under `path`.
    fn public_url(&self, path: &str) -> String;
}
