//! Backoffice sessions: shared-password login with opaque cookie tokens.
//!
//! ARCHITECTURE
//! ============
//! The backoffice has a single operator password (`BACKOFFICE_PASSWORD`).
//! A successful login mints a random token that travels only in an HttpOnly
//! cookie; the server keeps the SHA-256 of each live token and its expiry.
//! A leaked token table therefore cannot be replayed as cookies.
//!
//! TRADE-OFFS
//! ==========
//! Tokens live in process memory, so a restart signs every operator out.
//! Expired entries are pruned on each validation rather than by a sweeper.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::Rng;
use sha2::{Digest, Sha256};

pub const COOKIE_NAME: &str = "backoffice_token";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 8 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum BackofficeError {
    #[error("backoffice login is not configured")]
    Disabled,
    #[error("invalid password")]
    InvalidPassword,
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

/// Hex SHA-256 of a token, as stored in the session table.
#[must_use]
pub fn hash_token(token: &str) -> String {
    bytes_to_hex(&digest(token))
}

/// Random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Compare fixed-size digests without short-circuiting.
fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Clone)]
pub struct BackofficeAuth {
    password_digest: Option<[u8; 32]>,
    sessions: Arc<Mutex<HashMap<String, Instant>>>,
    ttl: Duration,
}

impl BackofficeAuth {
    /// `password = None` disables login entirely.
    #[must_use]
    pub fn new(password: Option<&str>, ttl: Duration) -> Self {
        Self {
            password_digest: password.filter(|p| !p.is_empty()).map(digest),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.password_digest.is_some()
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Check the password and mint a session token.
    ///
    /// # Errors
    ///
    /// `Disabled` when no password is configured, `InvalidPassword` on mismatch.
    pub fn login(&self, password: &str) -> Result<String, BackofficeError> {
        self.login_at(password, Instant::now())
    }

    fn login_at(&self, password: &str, now: Instant) -> Result<String, BackofficeError> {
        let expected = self.password_digest.as_ref().ok_or(BackofficeError::Disabled)?;
        if !digests_match(expected, &digest(password)) {
            tracing::warn!("backoffice login rejected");
            return Err(BackofficeError::InvalidPassword);
        }
        let token = generate_token();
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash_token(&token), now + self.ttl);
        tracing::info!("backoffice session issued");
        Ok(token)
    }

    #[must_use]
    pub fn validate(&self, token: &str) -> bool {
        self.validate_at(token, Instant::now())
    }

    fn validate_at(&self, token: &str, now: Instant) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, expires_at| *expires_at > now);
        sessions.contains_key(&hash_token(token))
    }

    /// Drop a token. Unknown tokens are ignored.
    pub fn revoke(&self, token: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&hash_token(token));
    }

    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
#[path = "backoffice_test.rs"]
mod tests;
