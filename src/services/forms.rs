//! Form payloads and the checks that run before anything reaches upstream.

use serde::Deserialize;

use crate::backend::ProfilePatch;
use crate::services::avatar::{self, MAX_AVATAR_BYTES};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PROFILE_NAME_LEN: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a valid email address.")]
    InvalidEmail,
    #[error("Password must be at least 6 characters.")]
    PasswordTooShort,
    #[error("Passwords do not match.")]
    PasswordMismatch,
    #[error("Profile name is required.")]
    EmptyProfileName,
    #[error("Profile name must be 24 characters or fewer.")]
    ProfileNameTooLong,
    #[error("Nothing to update.")]
    EmptyPatch,
    #[error("Avatar images must be 2 MB or smaller.")]
    AvatarTooLarge,
    #[error("Avatar must be a PNG, JPEG, GIF or WebP image.")]
    AvatarType,
    #[error("No file was uploaded.")]
    MissingFile,
}

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || normalized.contains(char::is_whitespace) {
        return None;
    }
    Some(normalized)
}

fn check_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

fn check_confirmation(password: &str, confirm: &str) -> Result<(), ValidationError> {
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

/// Trimmed profile name, or the reason it is unusable.
pub fn profile_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyProfileName);
    }
    if name.chars().count() > MAX_PROFILE_NAME_LEN {
        return Err(ValidationError::ProfileNameTooLong);
    }
    Ok(name.to_owned())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

impl LoginForm {
    /// Returns the normalized email. Login only requires a non-empty password;
    /// length rules belong to registration.
    pub fn validate(&self) -> Result<String, ValidationError> {
        let email = normalize_email(&self.email).ok_or(ValidationError::InvalidEmail)?;
        if self.password.is_empty() {
            return Err(ValidationError::PasswordTooShort);
        }
        Ok(email)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<String, ValidationError> {
        let email = normalize_email(&self.email).ok_or(ValidationError::InvalidEmail)?;
        check_password(&self.password)?;
        check_confirmation(&self.password, &self.confirm_password)?;
        Ok(email)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordForm {
    pub email: String,
}

impl ForgotPasswordForm {
    pub fn validate(&self) -> Result<String, ValidationError> {
        normalize_email(&self.email).ok_or(ValidationError::InvalidEmail)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordForm {
    pub password: String,
    pub confirm_password: String,
    /// Recovery token from the reset email link, when not signed in.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl ResetPasswordForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_password(&self.password)?;
        check_confirmation(&self.password, &self.confirm_password)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileForm {
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl ProfileForm {
    /// Trimmed name and avatar; a blank avatar counts as none.
    pub fn validate(&self) -> Result<(String, Option<String>), ValidationError> {
        let name = profile_name(&self.name)?;
        let avatar = self
            .avatar
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_owned);
        Ok((name, avatar))
    }
}

/// Normalize a profile patch: names are trimmed and length-checked, and at
/// least one field must be present.
pub fn validate_patch(patch: ProfilePatch) -> Result<ProfilePatch, ValidationError> {
    if patch.is_empty() {
        return Err(ValidationError::EmptyPatch);
    }
    let name = patch.name.as_deref().map(profile_name).transpose()?;
    Ok(ProfilePatch { name, avatar: patch.avatar })
}

pub fn validate_avatar(content_type: &str, len: usize) -> Result<(), ValidationError> {
    if len == 0 {
        return Err(ValidationError::MissingFile);
    }
    if len > MAX_AVATAR_BYTES {
        return Err(ValidationError::AvatarTooLarge);
    }
    if !avatar::is_allowed_content_type(content_type) {
        return Err(ValidationError::AvatarType);
    }
    Ok(())
}

#[cfg(test)]
#[path = "forms_test.rs"]
mod tests;
