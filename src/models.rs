//! Local entity shapes mirrored from the hosted backend.
//!
//! The backend owns users and profiles; these are the normalized copies the
//! session container keeps after authentication.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{ProfileRecord, UserRecord};

/// Name of the synthetic profile assigned to administrator accounts.
pub const ADMIN_PROFILE_NAME: &str = "Admin";
/// Avatar shown for the synthetic admin profile.
pub const ADMIN_PROFILE_AVATAR: &str = "/assets/avatars/admin.png";

/// A named, avatar-bearing sub-identity under one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub avatar: String,
}

impl Profile {
    /// The synthetic profile administrators get on login. Never stored upstream.
    #[must_use]
    pub fn admin() -> Self {
        Self { id: Uuid::nil(), name: ADMIN_PROFILE_NAME.to_owned(), avatar: ADMIN_PROFILE_AVATAR.to_owned() }
    }

    #[must_use]
    pub fn is_synthetic_admin(&self) -> bool {
        self.id.is_nil()
    }
}

impl From<ProfileRecord> for Profile {
    fn from(row: ProfileRecord) -> Self {
        Self { id: row.id, name: row.name, avatar: row.avatar_url.unwrap_or_default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub is_admin: bool,
    /// Profiles in the order the backend returned them.
    pub profiles: Vec<Profile>,
}

impl User {
    #[must_use]
    pub fn owns_profile(&self, profile_id: Uuid) -> bool {
        self.profiles.iter().any(|p| p.id == profile_id)
    }
}

impl From<UserRecord> for User {
    fn from(row: UserRecord) -> Self {
        Self {
            id: row.id,
            email: row.email,
            is_admin: row.is_admin,
            profiles: row.profiles.into_iter().map(Profile::from).collect(),
        }
    }
}
