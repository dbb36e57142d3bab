//! Route table and navigation guard.
//!
//! DESIGN
//! ======
//! `Route` is the parsed page path; the guard itself works on raw paths so
//! unknown URLs are still protected. Rules are evaluated in order and the
//! first match wins:
//!
//! 1. anonymous visitor on a non-public path -> `/login`
//! 2. admin on `/browse` -> `/admin`
//! 3. non-admin anywhere under `/admin` -> `/browse`
//! 4. no profile selected, outside `/profile` and `/admin` -> `/profile`

use std::fmt::Display;

use crate::services::session::SessionState;

pub const LOGIN_PATH: &str = "/login";
pub const BROWSE_PATH: &str = "/browse";
pub const PROFILE_PATH: &str = "/profile";
pub const ADMIN_PATH: &str = "/admin";

const PUBLIC_PATHS: &[&str] = &["/", "/login", "/register", "/forgot-password", "/reset-password"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Landing,
    Login,
    Register,
    ForgotPassword,
    ResetPassword,
    Profile,
    Browse,
    Movie(u32),
    Series(u32),
    Search,
    Admin,
    AdminContent,
    AdminUsers,
    AdminAnalytics,
    NotFound,
}

impl Route {
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let path = normalize(path);
        match path {
            "/" => Self::Landing,
            "/login" => Self::Login,
            "/register" => Self::Register,
            "/forgot-password" => Self::ForgotPassword,
            "/reset-password" => Self::ResetPassword,
            "/profile" => Self::Profile,
            "/browse" => Self::Browse,
            "/search" => Self::Search,
            "/admin" => Self::Admin,
            "/admin/content" => Self::AdminContent,
            "/admin/users" => Self::AdminUsers,
            "/admin/analytics" => Self::AdminAnalytics,
            _ => {
                if let Some(id) = path.strip_prefix("/movie/").and_then(|id| id.parse().ok()) {
                    Self::Movie(id)
                } else if let Some(id) = path.strip_prefix("/series/").and_then(|id| id.parse().ok()) {
                    Self::Series(id)
                } else {
                    Self::NotFound
                }
            }
        }
    }

    #[must_use]
    pub fn to_path(&self) -> String {
        match self {
            Self::Landing => "/".into(),
            Self::Login => "/login".into(),
            Self::Register => "/register".into(),
            Self::ForgotPassword => "/forgot-password".into(),
            Self::ResetPassword => "/reset-password".into(),
            Self::Profile => "/profile".into(),
            Self::Browse => "/browse".into(),
            Self::Movie(id) => format!("/movie/{id}"),
            Self::Series(id) => format!("/series/{id}"),
            Self::Search => "/search".into(),
            Self::Admin => "/admin".into(),
            Self::AdminContent => "/admin/content".into(),
            Self::AdminUsers => "/admin/users".into(),
            Self::AdminAnalytics => "/admin/analytics".into(),
            Self::NotFound => "/404".into(),
        }
    }

    #[must_use]
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Landing | Self::Login | Self::Register | Self::ForgotPassword | Self::ResetPassword)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin | Self::AdminContent | Self::AdminUsers | Self::AdminAnalytics)
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_path())
    }
}

/// The session facts the guard looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Access {
    pub is_authenticated: bool,
    pub has_selected_profile: bool,
    pub is_admin: bool,
}

impl From<&SessionState> for Access {
    fn from(state: &SessionState) -> Self {
        Self {
            is_authenticated: state.is_authenticated(),
            has_selected_profile: state.has_selected_profile(),
            is_admin: state.is_admin(),
        }
    }
}

/// Strip trailing slashes; an all-slash path is `/`.
fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

fn under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[must_use]
pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&normalize(path))
}

#[must_use]
pub fn is_admin_path(path: &str) -> bool {
    under(normalize(path), ADMIN_PATH)
}

/// Where to send a visitor requesting `path`, or `None` to let them through.
#[must_use]
pub fn resolve_redirect(access: Access, path: &str) -> Option<&'static str> {
    let path = normalize(path);

    if !access.is_authenticated {
        return (!is_public_path(path)).then_some(LOGIN_PATH);
    }
    if access.is_admin && path == BROWSE_PATH {
        return Some(ADMIN_PATH);
    }
    if !access.is_admin && is_admin_path(path) {
        return Some(BROWSE_PATH);
    }
    if !access.has_selected_profile && !under(path, PROFILE_PATH) && !is_admin_path(path) {
        return Some(PROFILE_PATH);
    }
    None
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
