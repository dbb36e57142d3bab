//! Avatar upload helpers: object paths and accepted image types.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::services::registry::bytes_to_hex;

/// Largest accepted avatar upload.
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

const HASH_PREFIX_BYTES: usize = 8;

/// Image types the storage bucket serves as avatars.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Storage path for an avatar: `<user>/<profile>-<content hash>.<ext>`.
/// Different image bytes always produce a different path.
#[must_use]
pub fn object_path(user_id: Uuid, profile_id: Uuid, file_name: &str, bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hash = bytes_to_hex(&digest[..HASH_PREFIX_BYTES]);
    let ext = extension(file_name).unwrap_or_else(|| "bin".to_owned());
    format!("{user_id}/{profile_id}-{hash}.{ext}")
}

/// Lowercased file extension, if it is short and alphanumeric.
#[must_use]
pub fn extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[must_use]
pub fn is_allowed_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ALLOWED_CONTENT_TYPES.contains(&essence.as_str())
}
