//! Session controller tuning, parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::time::Duration;

use crate::paths::Route;

pub const DEFAULT_REDIRECT_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Wait between a `SIGNED_IN` event and the post-login navigation, so the
    /// provider can finish persisting the new session first.
    pub redirect_delay: Duration,
    /// Where a fresh sign-in on an auth form lands.
    pub landing: Route,
    /// Where anonymous visitors of protected paths are sent.
    pub login: Route,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            redirect_delay: Duration::from_millis(DEFAULT_REDIRECT_DELAY_MS),
            landing: Route::Analyze,
            login: Route::Login,
        }
    }
}

impl SessionConfig {
    /// Build from the environment.
    ///
    /// Optional:
    /// - `SESSION_REDIRECT_DELAY_MS`: default 500
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            redirect_delay: Duration::from_millis(env_parse("SESSION_REDIRECT_DELAY_MS", DEFAULT_REDIRECT_DELAY_MS)),
            ..Self::default()
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
