//! Runtime configuration parsed from environment variables.
//!
//! `main` loads `.env` (when present) before calling [`AppConfig::from_env`],
//! so every value here can come from either the process environment or a
//! local dotenv file.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_AVATAR_BUCKET: &str = "avatars";
pub const DEFAULT_UPSTREAM_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REMEMBER_ME_DAYS: i64 = 30;
pub const DEFAULT_SESSION_IDLE_MINUTES: u64 = 60;
pub const DEFAULT_SESSION_SWEEP_SECS: u64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

/// Connection settings for the hosted backend (auth, tables, storage).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Project base URL without trailing slash, e.g. `https://abc.supabase.co`.
    pub url: String,
    /// Public anon key, sent as `apikey` on every request.
    pub anon_key: String,
    /// Storage bucket holding uploaded profile avatars.
    pub avatar_bucket: String,
    /// Where the password-reset email link should land.
    pub reset_redirect_url: Option<String>,
    pub timeouts: UpstreamTimeouts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub supabase: SupabaseConfig,
    /// Postgres URL for persisted session records. In-memory when absent.
    pub database_url: Option<String>,
    pub cookie_secure: bool,
    /// Lifetime of the session cookie when "remember me" is checked. Stored
    /// session records untouched for longer are purged.
    pub remember_me_days: i64,
    /// In-memory contexts idle this long are evicted; they rehydrate from
    /// stored records on the next request.
    pub session_idle_minutes: u64,
    pub session_sweep_secs: u64,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `SUPABASE_AVATAR_BUCKET`: default `avatars`
    /// - `PASSWORD_RESET_REDIRECT_URL`
    /// - `UPSTREAM_REQUEST_TIMEOUT_SECS`: default 30
    /// - `UPSTREAM_CONNECT_TIMEOUT_SECS`: default 10
    /// - `DATABASE_URL`
    /// - `COOKIE_SECURE`: inferred from `PASSWORD_RESET_REDIRECT_URL` scheme when unset
    /// - `REMEMBER_ME_DAYS`: default 30
    /// - `SESSION_IDLE_MINUTES`: default 60
    /// - `SESSION_SWEEP_SECS`: default 300
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { var: "PORT", value: raw })?,
            Err(_) => DEFAULT_PORT,
        };

        let url = required("SUPABASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Invalid { var: "SUPABASE_URL", value: url });
        }
        let anon_key = required("SUPABASE_ANON_KEY")?;
        let avatar_bucket = optional("SUPABASE_AVATAR_BUCKET").unwrap_or_else(|| DEFAULT_AVATAR_BUCKET.to_owned());
        let reset_redirect_url = optional("PASSWORD_RESET_REDIRECT_URL");
        let timeouts = UpstreamTimeouts {
            request_secs: env_parse("UPSTREAM_REQUEST_TIMEOUT_SECS", DEFAULT_UPSTREAM_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("UPSTREAM_CONNECT_TIMEOUT_SECS", DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS),
        };

        let cookie_secure = env_bool("COOKIE_SECURE").unwrap_or_else(|| {
            reset_redirect_url
                .as_deref()
                .is_some_and(|u| u.starts_with("https://"))
        });

        Ok(Self {
            port,
            supabase: SupabaseConfig { url, anon_key, avatar_bucket, reset_redirect_url, timeouts },
            database_url: optional("DATABASE_URL"),
            cookie_secure,
            remember_me_days: env_parse("REMEMBER_ME_DAYS", DEFAULT_REMEMBER_ME_DAYS),
            session_idle_minutes: env_parse("SESSION_IDLE_MINUTES", DEFAULT_SESSION_IDLE_MINUTES),
            session_sweep_secs: env_parse("SESSION_SWEEP_SECS", DEFAULT_SESSION_SWEEP_SECS),
        })
    }

    /// How long an in-memory session may sit unused before eviction.
    #[must_use]
    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_minutes.saturating_mul(60))
    }

    /// Age after which stored session records are deleted: the remember-me horizon.
    #[must_use]
    pub fn record_max_age(&self) -> Duration {
        let days = u64::try_from(self.remember_me_days).unwrap_or(0);
        Duration::from_secs(days.saturating_mul(24 * 60 * 60))
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::Missing(var))
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
