//! Session state container: who is signed in and which profile is active.
//!
//! ARCHITECTURE
//! ============
//! One `SessionContext` exists per browser session key. It owns the
//! `SessionState`, the upstream token pair and handles to the backend gateway
//! and snapshot store. Handlers reach it through the `SessionRegistry`; there
//! is no ambient global.
//!
//! Every backend-facing operation follows the same shape: mark loading and
//! clear the error, call upstream, normalize the result into local entities,
//! then either apply it or store a display message in `error`. Failures never
//! propagate to callers; they read the resulting `SessionView`.
//!
//! CONCURRENCY
//! ===========
//! Operations on one session are serialized by `op_gate`, held for the whole
//! operation. State sits behind a separate lock so readers see
//! `is_loading = true` while an operation is in flight.
//!
//! INVARIANTS
//! ==========
//! `is_authenticated` and `has_selected_profile` are derived from `user` and
//! `current_profile`; they are never stored, so they cannot drift.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::backend::{Backend, BackendError, NewProfile, ProfilePatch, UpstreamTokens};
use crate::models::{Profile, User};
use crate::services::avatar;
use crate::services::snapshot::{self, SESSION_RECORD, SessionSnapshot, SnapshotStore, UPSTREAM_RECORD};

// =============================================================================
// ERRORS
// =============================================================================

/// Failures surfaced to the user as display strings. The `Display` text is
/// what lands in `SessionState::error`; details only go to logs.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Unable to reach the server. Please check your connection and try again.")]
    Transport(String),
    #[error("Invalid email or password.")]
    Credential,
    #[error("An account with this email already exists.")]
    DuplicateAccount,
    #[error("We couldn't create your account. Please try again.")]
    Registration(String),
    #[error("Your account data could not be loaded. Please contact support.")]
    NotFound(&'static str),
    #[error("{0}")]
    Rejected(String),
    #[error("Unexpected response from the server. Please try again.")]
    Unexpected(String),
    #[error("Your session has expired. Please sign in again.")]
    NoUpstreamSession,
}

impl SessionError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_TRANSPORT",
            Self::Credential => "E_CREDENTIAL",
            Self::DuplicateAccount => "E_DUPLICATE_ACCOUNT",
            Self::Registration(_) => "E_REGISTRATION",
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::Rejected(_) => "E_REJECTED",
            Self::Unexpected(_) => "E_UNEXPECTED",
            Self::NoUpstreamSession => "E_NO_UPSTREAM_SESSION",
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Transport(d) | Self::Registration(d) | Self::Rejected(d) | Self::Unexpected(d) => d.clone(),
            Self::NotFound(what) => format!("missing {what} row"),
            Self::Credential | Self::DuplicateAccount | Self::NoUpstreamSession => String::new(),
        }
    }

    /// Classify a sign-in failure.
    fn from_sign_in(err: BackendError) -> Self {
        match err {
            BackendError::Rejected { code, message, .. }
                if matches!(code.as_deref(), Some("invalid_grant" | "invalid_credentials"))
                    || message
                        .to_ascii_lowercase()
                        .contains("invalid login credentials") =>
            {
                Self::Credential
            }
            other => Self::from_upstream(other),
        }
    }

    /// Classify a sign-up failure. Duplicate accounts are recognised by the
    /// upstream message text or its error code.
    fn from_sign_up(err: BackendError) -> Self {
        match err {
            BackendError::Transport(detail) => Self::Transport(detail),
            BackendError::Rejected { code, message, .. } => {
                if code.as_deref() == Some("user_already_exists")
                    || message
                        .to_ascii_lowercase()
                        .contains("already registered")
                {
                    Self::DuplicateAccount
                } else {
                    Self::Registration(message)
                }
            }
            other => Self::Registration(other.to_string()),
        }
    }

    fn from_upstream(err: BackendError) -> Self {
        match err {
            BackendError::Transport(detail) => Self::Transport(detail),
            BackendError::Rejected { message, .. } => Self::Rejected(message),
            other => Self::Unexpected(other.to_string()),
        }
    }
}

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    user: Option<User>,
    current_profile: Option<Profile>,
    is_loading: bool,
    error: Option<String>,
}

impl SessionState {
    /// Rebuild state from a persisted snapshot. Transient flags start neutral
    /// and a profile without a user is dropped.
    #[must_use]
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let current_profile = if snapshot.user.is_some() { snapshot.current_profile } else { None };
        Self { user: snapshot.user, current_profile, is_loading: false, error: None }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user: self.user.clone(),
            is_authenticated: self.is_authenticated(),
            current_profile: self.current_profile.clone(),
            has_selected_profile: self.has_selected_profile(),
        }
    }

    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            user: self.user.clone(),
            is_authenticated: self.is_authenticated(),
            current_profile: self.current_profile.clone(),
            has_selected_profile: self.has_selected_profile(),
            is_loading: self.is_loading,
            error: self.error.clone(),
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    #[must_use]
    pub fn has_selected_profile(&self) -> bool {
        self.current_profile.is_some()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.is_admin)
    }

    fn begin(&mut self) {
        self.is_loading = true;
        self.error = None;
    }

    fn clear_identity(&mut self) {
        self.user = None;
        self.current_profile = None;
    }

    /// Install an authenticated user. Admins get the synthetic profile when
    /// `select_admin_profile` is set; everyone else must pick one explicitly.
    fn authenticate(&mut self, user: User, select_admin_profile: bool) {
        self.current_profile = (select_admin_profile && user.is_admin).then(Profile::admin);
        self.user = Some(user);
    }

    /// Replace the profile with the same id in `user.profiles` and in
    /// `current_profile`.
    fn replace_profile(&mut self, updated: &Profile) {
        if let Some(user) = self.user.as_mut() {
            for profile in &mut user.profiles {
                if profile.id == updated.id {
                    *profile = updated.clone();
                }
            }
        }
        if let Some(current) = self.current_profile.as_mut() {
            if current.id == updated.id {
                *current = updated.clone();
            }
        }
    }

    fn push_profile(&mut self, profile: Profile) {
        if let Some(user) = self.user.as_mut() {
            match user.profiles.iter_mut().find(|p| p.id == profile.id) {
                Some(existing) => *existing = profile,
                None => user.profiles.push(profile),
            }
        }
    }
}

/// Render-ready copy of the full session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub current_profile: Option<Profile>,
    pub has_selected_profile: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// File accepted for an avatar upload.
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

// =============================================================================
// CONTEXT
// =============================================================================

pub struct SessionContext {
    key: String,
    backend: Arc<dyn Backend>,
    store: Arc<dyn SnapshotStore>,
    op_gate: Mutex<()>,
    state: RwLock<SessionState>,
    tokens: RwLock<Option<UpstreamTokens>>,
}

impl SessionContext {
    /// Fresh, empty session.
    #[must_use]
    pub fn new(key: String, backend: Arc<dyn Backend>, store: Arc<dyn SnapshotStore>) -> Self {
        Self::with_state(key, backend, store, SessionState::default(), None)
    }

    fn with_state(
        key: String,
        backend: Arc<dyn Backend>,
        store: Arc<dyn SnapshotStore>,
        state: SessionState,
        tokens: Option<UpstreamTokens>,
    ) -> Self {
        Self { key, backend, store, op_gate: Mutex::new(()), state: RwLock::new(state), tokens: RwLock::new(tokens) }
    }

    /// Restore a session from its persisted records. Unreadable records are
    /// logged and treated as absent.
    pub async fn rehydrate(key: String, backend: Arc<dyn Backend>, store: Arc<dyn SnapshotStore>) -> Self {
        let snapshot = match snapshot::load_record::<SessionSnapshot>(store.as_ref(), &key, SESSION_RECORD).await {
            Ok(s) => s.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(session = %short_key(&key), error = %e, "session snapshot unreadable; starting empty");
                SessionSnapshot::default()
            }
        };
        let tokens = match snapshot::load_record::<UpstreamTokens>(store.as_ref(), &key, UPSTREAM_RECORD).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(session = %short_key(&key), error = %e, "upstream token record unreadable");
                None
            }
        };
        let state = SessionState::from_snapshot(snapshot);
        tracing::debug!(
            session = %short_key(&key),
            authenticated = state.is_authenticated(),
            "session rehydrated"
        );
        Self::with_state(key, backend, store, state, tokens)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn view(&self) -> SessionView {
        self.state.read().await.view()
    }

    /// Run `f` against a read guard of the current state.
    pub async fn inspect<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&*self.state.read().await)
    }

    // -------------------------------------------------------------------------
    // operations
    // -------------------------------------------------------------------------

    pub async fn login(&self, email: &str, password: &str) -> SessionView {
        let _op = self.op_gate.lock().await;
        self.update(SessionState::begin).await;

        match self.try_login(email, password).await {
            Ok((user, tokens)) => {
                tracing::info!(session = %short_key(&self.key), user_id = %user.id, is_admin = user.is_admin, "login succeeded");
                self.store_tokens(Some(tokens)).await;
                self.update(|s| {
                    s.authenticate(user, true);
                    s.is_loading = false;
                })
                .await
            }
            Err(e) => {
                self.store_tokens(None).await;
                self.fail(e, true).await
            }
        }
    }

    async fn try_login(&self, email: &str, password: &str) -> Result<(User, UpstreamTokens), SessionError> {
        let auth = self
            .backend
            .sign_in(email, password)
            .await
            .map_err(SessionError::from_sign_in)?;
        let tokens = auth
            .tokens
            .ok_or_else(|| SessionError::Unexpected("sign-in returned no tokens".into()))?;
        match self.load_user(auth.user_id, Some(&tokens.access_token)).await {
            Ok(user) => Ok((user, tokens)),
            Err(e) => {
                self.revoke_upstream(&tokens).await;
                Err(e)
            }
        }
    }

    pub async fn register(&self, email: &str, password: &str) -> SessionView {
        let _op = self.op_gate.lock().await;
        self.update(SessionState::begin).await;

        let result = async {
            let auth = self
                .backend
                .sign_up(email, password)
                .await
                .map_err(SessionError::from_sign_up)?;
            let access = auth.tokens.as_ref().map(|t| t.access_token.clone());
            match self.load_user(auth.user_id, access.as_deref()).await {
                Ok(user) => Ok::<_, SessionError>((user, auth.tokens)),
                Err(e) => {
                    if let Some(tokens) = &auth.tokens {
                        self.revoke_upstream(tokens).await;
                    }
                    Err(e)
                }
            }
        }
        .await;

        match result {
            Ok((user, tokens)) => {
                tracing::info!(session = %short_key(&self.key), user_id = %user.id, "registration succeeded");
                self.store_tokens(tokens).await;
                self.update(|s| {
                    s.authenticate(user, false);
                    s.is_loading = false;
                })
                .await
            }
            Err(e) => {
                self.store_tokens(None).await;
                self.fail(e, true).await
            }
        }
    }

    /// Request a reset email. Upstream rejections (unknown address, rate
    /// limits) are reported as success so callers cannot probe for accounts.
    pub async fn reset_password(&self, email: &str) -> SessionView {
        let _op = self.op_gate.lock().await;
        self.update(SessionState::begin).await;

        match self.backend.request_password_reset(email).await {
            Ok(()) => {}
            Err(e) if e.is_transport() => return self.fail(SessionError::from_upstream(e), false).await,
            Err(e) => {
                tracing::info!(session = %short_key(&self.key), code = e.error_code(), error = %e, "password reset rejected upstream; reporting success");
            }
        }
        self.update(|s| s.is_loading = false).await
    }

    /// Change the password of the active upstream session, or of the recovery
    /// session named by `recovery_token` (from the reset email link).
    pub async fn update_password(&self, new_password: &str, recovery_token: Option<&str>) -> SessionView {
        let _op = self.op_gate.lock().await;
        self.update(SessionState::begin).await;

        let token = match recovery_token {
            Some(t) => Some(t.to_owned()),
            None => self.access_token().await,
        };
        let Some(token) = token else {
            return self.fail(SessionError::NoUpstreamSession, false).await;
        };

        match self.backend.update_password(&token, new_password).await {
            Ok(()) => {
                tracing::info!(session = %short_key(&self.key), "password updated");
                self.update(|s| s.is_loading = false).await
            }
            Err(e) => self.fail(SessionError::from_upstream(e), false).await,
        }
    }

    /// Sign out upstream and clear local state. Local state is cleared even
    /// when the upstream call fails; that failure is kept in `error`.
    pub async fn logout(&self) -> SessionView {
        let _op = self.op_gate.lock().await;
        self.update(SessionState::begin).await;

        let tokens = self.tokens.read().await.clone();
        let result = match tokens {
            Some(t) => self
                .backend
                .sign_out(&t.access_token)
                .await
                .map_err(SessionError::from_upstream),
            None => Ok(()),
        };
        self.store_tokens(None).await;

        if let Err(e) = &result {
            tracing::warn!(session = %short_key(&self.key), code = e.error_code(), detail = %e.detail(), "upstream sign-out failed");
        }
        let error = result.err().map(|e| e.to_string());
        self.update(|s| {
            s.clear_identity();
            s.is_loading = false;
            s.error = error;
        })
        .await
    }

    /// Make `profile` the active one. Local only; membership in
    /// `user.profiles` is not enforced.
    pub async fn select_profile(&self, profile: Profile) -> SessionView {
        let _op = self.op_gate.lock().await;
        let owned = self
            .inspect(|s| s.user().map(|u| u.owns_profile(profile.id)))
            .await;
        if owned == Some(false) && !profile.is_synthetic_admin() {
            tracing::warn!(session = %short_key(&self.key), profile_id = %profile.id, "selected profile is not in user.profiles");
        }
        self.update(|s| s.current_profile = Some(profile)).await
    }

    pub async fn update_profile(&self, profile_id: Uuid, patch: ProfilePatch) -> SessionView {
        let _op = self.op_gate.lock().await;
        self.update(SessionState::begin).await;

        match self.apply_profile_patch(profile_id, &patch).await {
            Ok(updated) => {
                self.update(|s| {
                    s.replace_profile(&updated);
                    s.is_loading = false;
                })
                .await
            }
            Err(e) => self.fail(e, false).await,
        }
    }

    /// Create a profile row for the signed-in user and append it locally.
    pub async fn add_profile(&self, name: &str, avatar: Option<String>) -> SessionView {
        let _op = self.op_gate.lock().await;
        self.update(SessionState::begin).await;

        let Some(user_id) = self.inspect(|s| s.user().map(|u| u.id)).await else {
            return self.fail(SessionError::NoUpstreamSession, false).await;
        };
        let row = NewProfile { id: Uuid::new_v4(), user_id, name: name.to_owned(), avatar_url: avatar };
        let token = self.access_token().await;

        match self.backend.upsert_profile(&row, token.as_deref()).await {
            Ok(record) => {
                let profile = Profile::from(record);
                tracing::info!(session = %short_key(&self.key), profile_id = %profile.id, "profile added");
                self.update(|s| {
                    s.push_profile(profile);
                    s.is_loading = false;
                })
                .await
            }
            Err(e) => self.fail(SessionError::from_upstream(e), false).await,
        }
    }

    /// Upload an avatar image and point the profile at its public URL.
    pub async fn upload_avatar(&self, profile_id: Uuid, upload: AvatarUpload) -> SessionView {
        let _op = self.op_gate.lock().await;
        self.update(SessionState::begin).await;

        let Some(user_id) = self.inspect(|s| s.user().map(|u| u.id)).await else {
            return self.fail(SessionError::NoUpstreamSession, false).await;
        };
        let AvatarUpload { file_name, content_type, bytes } = upload;
        let path = avatar::object_path(user_id, profile_id, &file_name, &bytes);
        let token = self.access_token().await;

        let result = async {
            self.backend
                .upload_object(&path, &content_type, bytes, token.as_deref())
                .await
                .map_err(SessionError::from_upstream)?;
            let patch = ProfilePatch { name: None, avatar: Some(self.backend.public_url(&path)) };
            self.apply_profile_patch(profile_id, &patch).await
        }
        .await;

        match result {
            Ok(updated) => {
                tracing::info!(session = %short_key(&self.key), profile_id = %profile_id, path = %path, "avatar uploaded");
                self.update(|s| {
                    s.replace_profile(&updated);
                    s.is_loading = false;
                })
                .await
            }
            Err(e) => self.fail(e, false).await,
        }
    }

    pub async fn clear_error(&self) -> SessionView {
        let _op = self.op_gate.lock().await;
        self.update(|s| s.error = None).await
    }

    /// Move identity and upstream tokens to a new context under `new_key`.
    /// This context is left empty and its stored records are deleted, so the
    /// old key no longer resolves to the signed-in user.
    pub async fn transfer_to(&self, new_key: String) -> Self {
        let _op = self.op_gate.lock().await;
        let state = std::mem::take(&mut *self.state.write().await);
        let tokens = self.tokens.write().await.take();

        let moved = Self::with_state(new_key, Arc::clone(&self.backend), Arc::clone(&self.store), state, None);
        let snapshot = moved.state.read().await.snapshot();
        moved.persist(&snapshot).await;
        moved.store_tokens(tokens).await;

        for name in [SESSION_RECORD, UPSTREAM_RECORD] {
            if let Err(e) = self.store.remove(&self.key, name).await {
                tracing::warn!(session = %short_key(&self.key), record = name, error = %e, "failed to delete retired session record");
            }
        }
        tracing::info!(from = %short_key(&self.key), to = %short_key(&moved.key), "session key rotated");
        moved
    }

    // -------------------------------------------------------------------------
    // helpers
    // -------------------------------------------------------------------------

    async fn load_user(&self, user_id: Uuid, access_token: Option<&str>) -> Result<User, SessionError> {
        let record = self
            .backend
            .fetch_user(user_id, access_token)
            .await
            .map_err(SessionError::from_upstream)?
            .ok_or(SessionError::NotFound("users"))?;
        Ok(User::from(record))
    }

    async fn apply_profile_patch(&self, profile_id: Uuid, patch: &ProfilePatch) -> Result<Profile, SessionError> {
        let token = self.access_token().await;
        self.backend
            .update_profile(profile_id, patch, token.as_deref())
            .await
            .map_err(SessionError::from_upstream)?
            .map(Profile::from)
            .ok_or(SessionError::NotFound("profiles"))
    }

    async fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .map(|t| t.access_token.clone())
    }

    /// Record a failure. `clear` also drops the signed-in identity.
    async fn fail(&self, err: SessionError, clear: bool) -> SessionView {
        tracing::warn!(
            session = %short_key(&self.key),
            code = err.error_code(),
            detail = %err.detail(),
            "session operation failed"
        );
        let message = err.to_string();
        self.update(|s| {
            if clear {
                s.clear_identity();
            }
            s.is_loading = false;
            s.error = Some(message);
        })
        .await
    }

    /// Mutate state and persist the snapshot if a persisted field changed.
    async fn update(&self, f: impl FnOnce(&mut SessionState)) -> SessionView {
        let (view, changed) = {
            let mut state = self.state.write().await;
            let before = state.snapshot();
            f(&mut *state);
            let after = state.snapshot();
            (state.view(), (before != after).then_some(after))
        };

        if let Some(snapshot) = changed {
            self.persist(&snapshot).await;
        }
        view
    }

    async fn persist(&self, snapshot: &SessionSnapshot) {
        if let Err(e) = snapshot::save_record(self.store.as_ref(), &self.key, SESSION_RECORD, snapshot).await {
            tracing::warn!(session = %short_key(&self.key), error = %e, "failed to persist session snapshot");
        }
    }

    /// Best-effort upstream sign-out for tokens that will not be kept.
    async fn revoke_upstream(&self, tokens: &UpstreamTokens) {
        if let Err(e) = self.backend.sign_out(&tokens.access_token).await {
            tracing::warn!(session = %short_key(&self.key), code = e.error_code(), error = %e, "failed to revoke discarded upstream session");
        }
    }

    async fn store_tokens(&self, tokens: Option<UpstreamTokens>) {
        let result = match &tokens {
            Some(t) => snapshot::save_record(self.store.as_ref(), &self.key, UPSTREAM_RECORD, t).await,
            None => self.store.remove(&self.key, UPSTREAM_RECORD).await,
        };
        if let Err(e) = result {
            tracing::warn!(session = %short_key(&self.key), error = %e, "failed to persist upstream tokens");
        }
        *self.tokens.write().await = tokens;
    }
}

/// Log-safe prefix of a session key.
pub(crate) fn short_key(key: &str) -> &str {
    key.get(..8).unwrap_or(key)
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
