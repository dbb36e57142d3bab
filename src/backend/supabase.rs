//! Supabase HTTP client: GoTrue auth, PostgREST tables, Storage objects.
//!
//! Thin `reqwest` wrapper. Response parsing lives in free functions so it can
//! be tested without a network.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde::Deserialize;
use uuid::Uuid;

use super::{AuthSession, AvatarOption, Backend, BackendError, NewProfile, ProfilePatch, ProfileRecord, UpstreamTokens, UserRecord};
use crate::config::SupabaseConfig;

const USER_SELECT: &str = "id,email,is_admin,profiles(id,name,avatar_url)";
const PROFILE_SELECT: &str = "id,name,avatar_url";

// =============================================================================
// CLIENT
// =============================================================================

pub struct SupabaseBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    avatar_bucket: String,
    reset_redirect_url: Option<String>,
}

impl SupabaseBackend {
    /// Build a client for the configured project.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &SupabaseConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            avatar_bucket: config.avatar_bucket.clone(),
            reset_redirect_url: config.reset_redirect_url.clone(),
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    /// Attach the project key and bearer. Without a user token the anon key
    /// doubles as the bearer, which is how the hosted service expects anon calls.
    fn authorize(&self, req: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
        req.header("apikey", &self.anon_key)
            .bearer_auth(access_token.unwrap_or(&self.anon_key))
    }

    async fn send(&self, req: RequestBuilder) -> Result<String, BackendError> {
        let response = req
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(parse_error(status.as_u16(), &text));
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl Backend for SupabaseBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let req = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({ "email": email, "password": password }));
        let body = self.send(self.authorize(req, None)).await?;
        let session = parse_auth_session(&body)?;
        if session.tokens.is_none() {
            return Err(BackendError::Parse("sign-in response carried no session tokens".into()));
        }
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let req = self
            .http
            .post(self.auth_url("signup"))
            .json(&serde_json::json!({ "email": email, "password": password }));
        let body = self.send(self.authorize(req, None)).await?;
        parse_auth_session(&body)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let req = self.http.post(self.auth_url("logout"));
        self.send(self.authorize(req, Some(access_token)))
            .await?;
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), BackendError> {
        let mut req = self
            .http
            .post(self.auth_url("recover"))
            .json(&serde_json::json!({ "email": email }));
        if let Some(redirect) = &self.reset_redirect_url {
            req = req.query(&[("redirect_to", redirect.as_str())]);
        }
        self.send(self.authorize(req, None)).await?;
        Ok(())
    }

    async fn update_password(&self, access_token: &str, new_password: &str) -> Result<(), BackendError> {
        let req = self
            .http
            .put(self.auth_url("user"))
            .json(&serde_json::json!({ "password": new_password }));
        self.send(self.authorize(req, Some(access_token)))
            .await?;
        Ok(())
    }

    async fn fetch_user(&self, user_id: Uuid, access_token: Option<&str>) -> Result<Option<UserRecord>, BackendError> {
        let req = self
            .http
            .get(self.rest_url("users"))
            .query(&[("id", format!("eq.{user_id}")), ("select", USER_SELECT.to_owned())]);
        let body = self.send(self.authorize(req, access_token)).await?;
        parse_first_row(&body)
    }

    async fn update_profile(
        &self,
        profile_id: Uuid,
        patch: &ProfilePatch,
        access_token: Option<&str>,
    ) -> Result<Option<ProfileRecord>, BackendError> {
        let req = self
            .http
            .patch(self.rest_url("profiles"))
            .query(&[("id", format!("eq.{profile_id}")), ("select", PROFILE_SELECT.to_owned())])
            .header("Prefer", "return=representation")
            .json(patch);
        let body = self.send(self.authorize(req, access_token)).await?;
        parse_first_row(&body)
    }

    async fn upsert_profile(
        &self,
        profile: &NewProfile,
        access_token: Option<&str>,
    ) -> Result<ProfileRecord, BackendError> {
        let req = self
            .http
            .post(self.rest_url("profiles"))
            .query(&[("select", PROFILE_SELECT)])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(profile);
        let body = self.send(self.authorize(req, access_token)).await?;
        parse_first_row(&body)?.ok_or_else(|| BackendError::Parse("upsert returned no rows".into()))
    }

    async fn list_avatars(&self, category: Option<&str>) -> Result<Vec<AvatarOption>, BackendError> {
        let mut query = vec![("select", "id,url,category".to_owned()), ("order", "category.asc".to_owned())];
        if let Some(category) = category {
            query.push(("category", format!("eq.{category}")));
        }
        let req = self.http.get(self.rest_url("avatars")).query(&query);
        let body = self.send(self.authorize(req, None)).await?;
        serde_json::from_str(&body).map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn upload_object(
        &self,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
        access_token: Option<&str>,
    ) -> Result<(), BackendError> {
        let url = format!("{}/storage/v1/object/{}/{path}", self.base_url, self.avatar_bucket);
        let req = self
            .http
            .post(url)
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes);
        self.send(self.authorize(req, access_token))
            .await?;
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        public_object_url(&self.base_url, &self.avatar_bucket, path)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse a sign-in/sign-up body. Sign-up without email confirmation returns a
/// full token response; with confirmation pending it returns the bare user.
fn parse_auth_session(json: &str) -> Result<AuthSession, BackendError> {
    if let Ok(token) = serde_json::from_str::<TokenResponse>(json) {
        return Ok(AuthSession {
            user_id: token.user.id,
            email: token.user.email.unwrap_or_default(),
            tokens: Some(UpstreamTokens { access_token: token.access_token, refresh_token: token.refresh_token }),
        });
    }

    let user: AuthUser = serde_json::from_str(json).map_err(|e| BackendError::Parse(e.to_string()))?;
    Ok(AuthSession { user_id: user.id, email: user.email.unwrap_or_default(), tokens: None })
}

/// Normalize an upstream error body. GoTrue and PostgREST use different
/// field names for the same idea; take the most specific one present.
fn parse_error(status: u16, body: &str) -> BackendError {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        let message = if body.trim().is_empty() { format!("status {status}") } else { body.trim().to_owned() };
        return BackendError::Rejected { status, code: None, message };
    };

    let code = parsed.error_code.or_else(|| match parsed.code {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    });
    let message = parsed
        .msg
        .or(parsed.error_description)
        .or(parsed.message)
        .or_else(|| parsed.error.clone())
        .unwrap_or_else(|| format!("status {status}"));
    let code = code.or(parsed.error);

    BackendError::Rejected { status, code, message }
}

/// PostgREST returns arrays; take the first row if any.
fn parse_first_row<T: serde::de::DeserializeOwned>(json: &str) -> Result<Option<T>, BackendError> {
    let rows: Vec<T> = serde_json::from_str(json).map_err(|e| BackendError::Parse(e.to_string()))?;
    Ok(rows.into_iter().next())
}

fn public_object_url(base_url: &str, bucket: &str, path: &str) -> String {
    format!("{base_url}/storage/v1/object/public/{bucket}/{path}")
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
