//! Profile routes: create, select, edit, avatar upload, default avatars.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::{BrowserSession, validation_failed};
use crate::backend::ProfilePatch;
use crate::models::Profile;
use crate::services::forms::{self, ProfileForm};
use crate::services::session::AvatarUpload;
use crate::state::AppState;

const DEFAULT_UPLOAD_NAME: &str = "avatar";

/// Profile endpoints act on the signed-in user; anonymous sessions get 401.
async fn require_user(session: &BrowserSession) -> Result<(), Response> {
    if session.ctx.inspect(|s| s.is_authenticated()).await {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "Please sign in first." }))).into_response())
    }
}

/// `POST /api/profiles`
pub async fn create_profile(
    State(state): State<AppState>,
    session: BrowserSession,
    Json(form): Json<ProfileForm>,
) -> Response {
    if let Err(resp) = require_user(&session).await {
        return resp;
    }
    let (name, avatar) = match form.validate() {
        Ok(v) => v,
        Err(e) => return validation_failed(&e),
    };
    let view = session.ctx.add_profile(&name, avatar).await;
    session.respond(&state.config, view)
}

/// `POST /api/profiles/select`: body is the profile to make current.
pub async fn select_profile(
    State(state): State<AppState>,
    session: BrowserSession,
    Json(profile): Json<Profile>,
) -> Response {
    if let Err(resp) = require_user(&session).await {
        return resp;
    }
    let view = session.ctx.select_profile(profile).await;
    session.respond(&state.config, view)
}

/// `PATCH /api/profiles/{id}`
pub async fn update_profile(
    State(state): State<AppState>,
    session: BrowserSession,
    Path(id): Path<Uuid>,
    Json(patch): Json<ProfilePatch>,
) -> Response {
    if let Err(resp) = require_user(&session).await {
        return resp;
    }
    let patch = match forms::validate_patch(patch) {
        Ok(p) => p,
        Err(e) => return validation_failed(&e),
    };
    let view = session.ctx.update_profile(id, patch).await;
    session.respond(&state.config, view)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQuery {
    file_name: Option<String>,
}

/// `POST /api/profiles/{id}/avatar`: raw image body; `Content-Type` names
/// the image type and `?fileName=` supplies the extension.
pub async fn upload_avatar(
    State(state): State<AppState>,
    session: BrowserSession,
    Path(id): Path<Uuid>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = require_user(&session).await {
        return resp;
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    if let Err(e) = forms::validate_avatar(&content_type, body.len()) {
        return validation_failed(&e);
    }

    let upload = AvatarUpload {
        file_name: query
            .file_name
            .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_owned()),
        content_type,
        bytes: body.to_vec(),
    };
    let view = session.ctx.upload_avatar(id, upload).await;
    session.respond(&state.config, view)
}

#[derive(Debug, Deserialize)]
pub struct AvatarQuery {
    category: Option<String>,
}

/// `GET /api/avatars?category=`
pub async fn list_avatars(State(state): State<AppState>, Query(query): Query<AvatarQuery>) -> Response {
    match state.backend.list_avatars(query.category.as_deref()).await {
        Ok(avatars) => Json(avatars).into_response(),
        Err(e) => {
            tracing::error!(code = e.error_code(), error = %e, "avatar list failed");
            (StatusCode::BAD_GATEWAY, "Failed to load avatars").into_response()
        }
    }
}

#[cfg(test)]
#[path = "profiles_test.rs"]
mod tests;
