//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! JSON API under `/api` drives the session container; every other path is a
//! page route that passes through the navigation guard before rendering its
//! page model. Both share one cookie-keyed session per browser.

pub mod auth;
pub mod guard;
pub mod pages;
pub mod profiles;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, patch, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::services::avatar::MAX_AVATAR_BYTES;
use crate::state::AppState;

/// Upload bodies may exceed the avatar limit so oversize files get a
/// validation message instead of a bare 413.
const UPLOAD_BODY_LIMIT: usize = MAX_AVATAR_BYTES * 2;

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/session", get(auth::session))
        .route("/api/session/clear-error", post(auth::clear_error))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/reset-password", post(auth::reset_password))
        .route("/api/auth/update-password", post(auth::update_password))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/profiles", post(profiles::create_profile))
        .route("/api/profiles/select", post(profiles::select_profile))
        .route("/api/profiles/{id}", patch(profiles::update_profile))
        .route(
            "/api/profiles/{id}/avatar",
            post(profiles::upload_avatar).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/avatars", get(profiles::list_avatars))
        .route("/healthz", get(healthz))
}

/// Full application router: API routes plus guarded page fallback.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api_routes()
        .fallback(pages::render)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /healthz`: liveness plus the number of in-memory sessions.
async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.sessions.live_count().await;
    Json(serde_json::json!({ "status": "ok", "sessions": sessions }))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
