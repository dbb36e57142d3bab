//! Auth routes: session cookie, login/registration, password flows, logout.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use crate::config::AppConfig;
use crate::services::forms::{ForgotPasswordForm, LoginForm, RegisterForm, ResetPasswordForm, ValidationError};
use crate::services::session::{SessionContext, SessionView};
use crate::state::AppState;

pub const COOKIE_NAME: &str = "sf_session";

// =============================================================================
// SESSION EXTRACTOR
// =============================================================================

/// The caller's session context, resolved from the session cookie. A browser
/// without a usable cookie gets a fresh context and `issued` is set.
pub struct BrowserSession {
    pub ctx: Arc<SessionContext>,
    pub issued: bool,
}

impl<S> axum::extract::FromRequestParts<S> for BrowserSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let key = jar.get(COOKIE_NAME).map(Cookie::value);

        let app_state = AppState::from_ref(state);
        let (ctx, issued) = app_state.sessions.open(key).await;
        Ok(Self { ctx, issued })
    }
}

impl BrowserSession {
    /// Cookie jar carrying the session cookie when it was just issued.
    #[must_use]
    pub fn jar(&self, config: &AppConfig) -> CookieJar {
        let jar = CookieJar::new();
        if self.issued { jar.add(session_cookie(config, self.ctx.key(), false)) } else { jar }
    }

    /// `(jar, json view)` with status 200.
    pub fn respond(&self, config: &AppConfig, view: SessionView) -> Response {
        (self.jar(config), Json(view)).into_response()
    }
}

/// Build the session cookie. With `remember` the cookie outlives the browser
/// session for `remember_me_days`; otherwise it is a session cookie.
pub(crate) fn session_cookie(config: &AppConfig, key: &str, remember: bool) -> Cookie<'static> {
    let mut cookie = Cookie::build((COOKIE_NAME, key.to_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure);
    if remember {
        cookie = cookie.max_age(Duration::days(config.remember_me_days));
    }
    cookie.build()
}

pub(crate) fn validation_failed(err: &ValidationError) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /api/session`: current session state.
pub async fn session(State(state): State<AppState>, session: BrowserSession) -> Response {
    let view = session.ctx.view().await;
    session.respond(&state.config, view)
}

/// `POST /api/auth/login`
pub async fn login(State(state): State<AppState>, session: BrowserSession, Json(form): Json<LoginForm>) -> Response {
    let email = match form.validate() {
        Ok(email) => email,
        Err(e) => return validation_failed(&e),
    };

    let view = session.ctx.login(&email, &form.password).await;
    if !view.is_authenticated {
        return session.respond(&state.config, view);
    }

    // New key at sign-in; the cookie lifetime follows "remember me".
    let ctx = state.sessions.rotate(&session.ctx).await;
    let cookie = session_cookie(&state.config, ctx.key(), form.remember_me);
    (CookieJar::new().add(cookie), Json(view)).into_response()
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    session: BrowserSession,
    Json(form): Json<RegisterForm>,
) -> Response {
    let email = match form.validate() {
        Ok(email) => email,
        Err(e) => return validation_failed(&e),
    };
    let view = session.ctx.register(&email, &form.password).await;
    if !view.is_authenticated {
        return session.respond(&state.config, view);
    }

    let ctx = state.sessions.rotate(&session.ctx).await;
    let cookie = session_cookie(&state.config, ctx.key(), false);
    (CookieJar::new().add(cookie), Json(view)).into_response()
}

/// `POST /api/auth/reset-password`: request a reset email.
pub async fn reset_password(
    State(state): State<AppState>,
    session: BrowserSession,
    Json(form): Json<ForgotPasswordForm>,
) -> Response {
    let email = match form.validate() {
        Ok(email) => email,
        Err(e) => return validation_failed(&e),
    };
    let view = session.ctx.reset_password(&email).await;
    session.respond(&state.config, view)
}

/// `POST /api/auth/update-password`
pub async fn update_password(
    State(state): State<AppState>,
    session: BrowserSession,
    Json(form): Json<ResetPasswordForm>,
) -> Response {
    if let Err(e) = form.validate() {
        return validation_failed(&e);
    }
    let view = session
        .ctx
        .update_password(&form.password, form.access_token.as_deref())
        .await;
    session.respond(&state.config, view)
}

/// `POST /api/auth/logout`
pub async fn logout(State(state): State<AppState>, session: BrowserSession) -> Response {
    let view = session.ctx.logout().await;
    // Drop any persistent lifetime; the key stays valid for the anonymous session.
    let cookie = session_cookie(&state.config, session.ctx.key(), false);
    (CookieJar::new().add(cookie), Json(view)).into_response()
}

/// `POST /api/session/clear-error`
pub async fn clear_error(State(state): State<AppState>, session: BrowserSession) -> Response {
    let view = session.ctx.clear_error().await;
    session.respond(&state.config, view)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
