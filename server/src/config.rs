//! Server configuration parsed from environment variables.
//!
//! Required:
//! - `SUPABASE_URL`, `SUPABASE_ANON_KEY`: token verification
//! - `SUPABASE_SERVICE_ROLE_KEY`: usage counts (bypasses row-level security)
//!
//! Optional:
//! - `PORT`: default 3000
//! - `USAGE_TABLE`: default `analyses`
//! - `USAGE_MONTHLY_LIMIT`: default 50
//! - `USAGE_CACHE_TTL_SECS`: default 60
//! - `BACKOFFICE_PASSWORD`: backoffice login disabled when absent
//! - `BACKOFFICE_SESSION_TTL_SECS`: default 28800 (8 h)
//! - `COOKIE_SECURE`: default false
//! - `RESEND_API_KEY`, `CONTACT_FROM`, `CONTACT_TO`: all three enable the
//!   contact form

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::time::Duration;

use session::supabase::SupabaseConfig;

use crate::services::backoffice::DEFAULT_SESSION_TTL_SECS;
use crate::services::usage::{DEFAULT_CACHE_TTL_SECS, DEFAULT_MONTHLY_LIMIT, DEFAULT_USAGE_TABLE};

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
}

/// Resend credentials and the inbox form submissions go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactConfig {
    pub resend_api_key: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub supabase: SupabaseConfig,
    pub service_role_key: String,
    pub usage_table: String,
    pub usage_monthly_limit: u64,
    pub usage_cache_ttl: Duration,
    pub backoffice_password: Option<String>,
    pub backoffice_session_ttl: Duration,
    pub cookie_secure: bool,
    pub contact: Option<ContactConfig>,
}

impl AppConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` for the first absent required variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as absent.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let parse = |key: &str| get(key).and_then(|v| v.parse::<u64>().ok());

        let supabase = SupabaseConfig::new(require("SUPABASE_URL")?, require("SUPABASE_ANON_KEY")?);
        let service_role_key = require("SUPABASE_SERVICE_ROLE_KEY")?;

        let contact = match (get("RESEND_API_KEY"), get("CONTACT_FROM"), get("CONTACT_TO")) {
            (Some(resend_api_key), Some(from), Some(to)) => Some(ContactConfig { resend_api_key, from, to }),
            _ => None,
        };

        Ok(Self {
            port: get("PORT").and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_PORT),
            supabase,
            service_role_key,
            usage_table: get("USAGE_TABLE").unwrap_or_else(|| DEFAULT_USAGE_TABLE.to_owned()),
            usage_monthly_limit: parse("USAGE_MONTHLY_LIMIT").unwrap_or(DEFAULT_MONTHLY_LIMIT),
            usage_cache_ttl: Duration::from_secs(parse("USAGE_CACHE_TTL_SECS").unwrap_or(DEFAULT_CACHE_TTL_SECS)),
            backoffice_password: get("BACKOFFICE_PASSWORD"),
            backoffice_session_ttl: Duration::from_secs(
                parse("BACKOFFICE_SESSION_TTL_SECS").unwrap_or(DEFAULT_SESSION_TTL_SECS),
            ),
            cookie_secure: get("COOKIE_SECURE")
                .as_deref()
                .and_then(parse_bool)
                .unwrap_or(false),
            contact,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
