//! In-process `Backend` used by tests: a handful of accounts plus per-call
//! failure injection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use uuid::Uuid;

use super::{AuthSession, AvatarOption, Backend, BackendError, NewProfile, ProfilePatch, ProfileRecord, UpstreamTokens, UserRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    SignIn,
    SignUp,
    SignOut,
    ResetPassword,
    UpdatePassword,
    FetchUser,
    UpdateProfile,
    UpsertProfile,
    ListAvatars,
    Upload,
}

/// Holds `sign_in` mid-flight: the call signals `entered`, then waits for
/// `release`.
#[derive(Default)]
pub struct Pause {
    pub entered: Notify,
    pub release: Notify,
}

struct Account {
    password: String,
    record: UserRecord,
}

#[derive(Default)]
pub struct MockBackend {
    accounts: Mutex<Vec<Account>>,
    failures: Mutex<HashMap<Op, BackendError>>,
    calls: Mutex<Vec<Op>>,
    /// When set, sign-up succeeds upstream but no user row appears.
    skip_signup_row: Mutex<bool>,
    /// When set, `fetch_user` finds no row even for known accounts.
    hide_user_rows: Mutex<bool>,
    sign_in_pause: Mutex<Option<Arc<Pause>>>,
    uploads: Mutex<Vec<String>>,
    avatars: Vec<AvatarOption>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_avatars(avatars: Vec<AvatarOption>) -> Self {
        Self { avatars, ..Self::default() }
    }

    /// Register an account and return its user id.
    pub fn add_account(&self, email: &str, password: &str, is_admin: bool, profiles: Vec<ProfileRecord>) -> Uuid {
        let id = Uuid::new_v4();
        let record = UserRecord { id, email: email.to_owned(), is_admin, profiles };
        self.accounts
            .lock()
            .unwrap()
            .push(Account { password: password.to_owned(), record });
        id
    }

    /// Make every future call of `op` fail with `err`.
    pub fn fail(&self, op: Op, err: BackendError) {
        self.failures.lock().unwrap().insert(op, err);
    }

    pub fn heal(&self, op: Op) {
        self.failures.lock().unwrap().remove(&op);
    }

    pub fn skip_signup_row(&self) {
        *self.skip_signup_row.lock().unwrap() = true;
    }

    pub fn hide_user_rows(&self) {
        *self.hide_user_rows.lock().unwrap() = true;
    }

    /// Make every future `sign_in` wait on the returned pause.
    #[must_use]
    pub fn pause_sign_in(&self) -> Arc<Pause> {
        let pause = Arc::new(Pause::default());
        *self.sign_in_pause.lock().unwrap() = Some(Arc::clone(&pause));
        pause
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Op> {
        self.calls.lock().unwrap().clone()
    }

    #[must_use]
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    #[must_use]
    pub fn profile(&self, profile_id: Uuid) -> Option<ProfileRecord> {
        let accounts = self.accounts.lock().unwrap();
        accounts
            .iter()
            .flat_map(|a| a.record.profiles.iter())
            .find(|p| p.id == profile_id)
            .cloned()
    }

    fn enter(&self, op: Op) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(op);
        match self.failures.lock().unwrap().get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn tokens_for(id: Uuid) -> UpstreamTokens {
        UpstreamTokens { access_token: format!("access-{id}"), refresh_token: format!("refresh-{id}") }
    }
}

pub fn transport_error() -> BackendError {
    BackendError::Transport("connection refused".into())
}

pub fn rejected(status: u16, message: &str) -> BackendError {
    BackendError::Rejected { status, code: None, message: message.to_owned() }
}

#[async_trait::async_trait]
impl Backend for MockBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        self.enter(Op::SignIn)?;
        let pause = self.sign_in_pause.lock().unwrap().clone();
        if let Some(pause) = pause {
            pause.entered.notify_one();
            pause.release.notified().await;
        }
        let accounts = self.accounts.lock().unwrap();
        let account = accounts
            .iter()
            .find(|a| a.record.email == email && a.password == password)
            .ok_or_else(|| BackendError::Rejected {
                status: 400,
                code: Some("invalid_credentials".into()),
                message: "Invalid login credentials".into(),
            })?;
        let id = account.record.id;
        Ok(AuthSession { user_id: id, email: email.to_owned(), tokens: Some(Self::tokens_for(id)) })
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        self.enter(Op::SignUp)?;
        if self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .any(|a| a.record.email == email)
        {
            return Err(BackendError::Rejected { status: 422, code: None, message: "User already registered".into() });
        }
        let id = if *self.skip_signup_row.lock().unwrap() {
            Uuid::new_v4()
        } else {
            self.add_account(email, password, false, Vec::new())
        };
        Ok(AuthSession { user_id: id, email: email.to_owned(), tokens: Some(Self::tokens_for(id)) })
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), BackendError> {
        self.enter(Op::SignOut)
    }

    async fn request_password_reset(&self, _email: &str) -> Result<(), BackendError> {
        self.enter(Op::ResetPassword)
    }

    async fn update_password(&self, _access_token: &str, _new_password: &str) -> Result<(), BackendError> {
        self.enter(Op::UpdatePassword)
    }

    async fn fetch_user(&self, user_id: Uuid, _access_token: Option<&str>) -> Result<Option<UserRecord>, BackendError> {
        self.enter(Op::FetchUser)?;
        if *self.hide_user_rows.lock().unwrap() {
            return Ok(None);
        }
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts
            .iter()
            .find(|a| a.record.id == user_id)
            .map(|a| a.record.clone()))
    }

    async fn update_profile(
        &self,
        profile_id: Uuid,
        patch: &ProfilePatch,
        _access_token: Option<&str>,
    ) -> Result<Option<ProfileRecord>, BackendError> {
        self.enter(Op::UpdateProfile)?;
        let mut accounts = self.accounts.lock().unwrap();
        let row = accounts
            .iter_mut()
            .flat_map(|a| a.record.profiles.iter_mut())
            .find(|p| p.id == profile_id);
        Ok(row.map(|p| {
            if let Some(name) = &patch.name {
                p.name.clone_from(name);
            }
            if let Some(avatar) = &patch.avatar {
                p.avatar_url = Some(avatar.clone());
            }
            p.clone()
        }))
    }

    async fn upsert_profile(
        &self,
        profile: &NewProfile,
        _access_token: Option<&str>,
    ) -> Result<ProfileRecord, BackendError> {
        self.enter(Op::UpsertProfile)?;
        let record = ProfileRecord { id: profile.id, name: profile.name.clone(), avatar_url: profile.avatar_url.clone() };
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(account) = accounts
            .iter_mut()
            .find(|a| a.record.id == profile.user_id)
        {
            account.record.profiles.push(record.clone());
        }
        Ok(record)
    }

    async fn list_avatars(&self, category: Option<&str>) -> Result<Vec<AvatarOption>, BackendError> {
        self.enter(Op::ListAvatars)?;
        Ok(self
            .avatars
            .iter()
            .filter(|a| category.is_none_or(|c| a.category == c))
            .cloned()
            .collect())
    }

    async fn upload_object(
        &self,
        path: &str,
        _content_type: &str,
        _bytes: Vec<u8>,
        _access_token: Option<&str>,
    ) -> Result<(), BackendError> {
        self.enter(Op::Upload)?;
        self.uploads.lock().unwrap().push(path.to_owned());
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://cdn.test/avatars/{path}")
    }
}
