//! Page routes: guarded navigation and the data each page renders.
//!
//! Every non-API path lands here. The guard runs first; a redirect wins over
//! rendering. Otherwise the response is a JSON page model: the route, its
//! section, the session view and the route's data.

use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Json, Redirect, Response};
use serde::{Deserialize, Serialize};

use super::auth::BrowserSession;
use super::guard::{self, Access, Route};
use crate::services::catalog::{ContentFilter, TitleKind, UserFilter};
use crate::services::session::SessionView;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Public,
    App,
    Admin,
}

impl Section {
    fn of(route: Route) -> Self {
        if route.is_admin() {
            Self::Admin
        } else if route.is_public() {
            Self::Public
        } else {
            Self::App
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PageModel {
    pub route: String,
    pub section: Section,
    pub session: SessionView,
    pub data: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

/// Fallback handler for every page path.
pub async fn render(State(state): State<AppState>, session: BrowserSession, uri: Uri) -> Response {
    let path = uri.path();
    if path.starts_with("/api/") {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "Unknown endpoint." }))).into_response();
    }
    let jar = session.jar(&state.config);

    let access = session.ctx.inspect(|s| Access::from(s)).await;
    if let Some(target) = guard::resolve_redirect(access, path) {
        tracing::debug!(%path, %target, "guard redirect");
        return (jar, Redirect::temporary(target)).into_response();
    }

    let route = Route::from_path(path);
    let (status, data) = page_data(&state, &session, route, &uri).await;
    let model = PageModel {
        route: route.to_path(),
        section: Section::of(route),
        session: session.ctx.view().await,
        data,
    };
    (status, jar, Json(model)).into_response()
}

fn query<T: serde::de::DeserializeOwned + Default>(uri: &Uri) -> T {
    Query::<T>::try_from_uri(uri)
        .map(|Query(q)| q)
        .unwrap_or_default()
}

async fn page_data(state: &AppState, session: &BrowserSession, route: Route, uri: &Uri) -> (StatusCode, serde_json::Value) {
    let catalog = &state.catalog;
    let data = match route {
        Route::Landing => serde_json::json!({ "featured": catalog.featured() }),
        Route::Login | Route::Register | Route::ForgotPassword | Route::ResetPassword => serde_json::Value::Null,
        Route::Profile => {
            let profiles = session
                .ctx
                .inspect(|s| s.user().map(|u| u.profiles.clone()).unwrap_or_default())
                .await;
            serde_json::json!({ "profiles": profiles })
        }
        Route::Browse => serde_json::json!({ "featured": catalog.featured(), "rows": catalog.rows() }),
        Route::Movie(id) | Route::Series(id) => {
            let kind = if matches!(route, Route::Movie(_)) { TitleKind::Movie } else { TitleKind::Series };
            match catalog.get(kind, id) {
                Some(title) => serde_json::json!({ "title": title }),
                None => return (StatusCode::NOT_FOUND, serde_json::json!({ "error": "Title not found." })),
            }
        }
        Route::Search => {
            let SearchQuery { q } = query(uri);
            let q = q.unwrap_or_default();
            serde_json::json!({ "query": q, "results": catalog.search(&q) })
        }
        Route::Admin | Route::AdminAnalytics => serde_json::json!({ "analytics": catalog.analytics() }),
        Route::AdminContent => {
            let filter: ContentFilter = query(uri);
            serde_json::json!({ "content": catalog.admin_titles(&filter) })
        }
        Route::AdminUsers => {
            let filter: UserFilter = query(uri);
            serde_json::json!({ "users": catalog.admin_users(&filter) })
        }
        Route::NotFound => return (StatusCode::NOT_FOUND, serde_json::json!({ "error": "Page not found." })),
    };
    (StatusCode::OK, data)
}

#[cfg(test)]
#[path = "pages_test.rs"]
mod tests;
