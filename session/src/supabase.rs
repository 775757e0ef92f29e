//! Supabase (GoTrue) identity provider.
//!
//! SYSTEM CONTEXT
//! ==============
//! Speaks the GoTrue REST API directly: password and refresh-token grants on
//! `/auth/v1/token`, user lookup on `/auth/v1/user`, and `/auth/v1/logout`.
//! The session lives in memory; every state change is published on the
//! provider's `EventHub`, and new subscribers get `INITIAL_SESSION` first, the
//! way the Supabase JS client behaves.
//!
//! ERROR HANDLING
//! ==============
//! A rejected access token (`401`/`403`) triggers one refresh-token grant.
//! If that grant is rejected too, or there is no refresh token, the stored
//! session is cleared and the result is "no session", not an error.
//! Sign-out always clears the local session and publishes `SIGNED_OUT`, even
//! when the remote revoke fails; the failure is still returned to the caller.

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ProviderError;
use crate::provider::{AuthEvent, AuthEventKind, EventHub, IdentityProvider, Session, Subscription, User};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Project URL and public (anon) API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

impl SupabaseConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_owned();
        Self { url, anon_key: anon_key.into() }
    }

    /// Load from `SUPABASE_URL` and `SUPABASE_ANON_KEY`.
    /// Returns `None` if either is missing.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("SUPABASE_URL").ok()?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY").ok()?;
        Some(Self::new(url, anon_key))
    }
}

fn token_endpoint(base: &str, grant_type: &str) -> String {
    format!("{base}/auth/v1/token?grant_type={grant_type}")
}

fn user_endpoint(base: &str) -> String {
    format!("{base}/auth/v1/user")
}

fn logout_endpoint(base: &str) -> String {
    format!("{base}/auth/v1/logout")
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

impl From<TokenResponse> for Session {
    fn from(resp: TokenResponse) -> Self {
        Self { access_token: resp.access_token, refresh_token: resp.refresh_token, user: resp.user }
    }
}

/// Pull a human-readable message out of a GoTrue error body.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error_description: Option<String>,
        msg: Option<String>,
        message: Option<String>,
        error: Option<String>,
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(b) => b
            .error_description
            .or(b.msg)
            .or(b.message)
            .or(b.error)
            .unwrap_or_else(|| body.trim().to_owned()),
        Err(_) => body.trim().to_owned(),
    }
}

async fn api_error(resp: reqwest::Response) -> ProviderError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    ProviderError::Api { status, message: error_message(&body) }
}

fn transport(e: reqwest::Error) -> ProviderError {
    ProviderError::Transport(e.to_string())
}

pub struct SupabaseAuth {
    http: reqwest::Client,
    config: SupabaseConfig,
    session: Mutex<Option<Session>>,
    hub: EventHub,
}

impl SupabaseAuth {
    /// Build a client for the given project.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: SupabaseConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(transport)?;
        Ok(Self { http, config, session: Mutex::new(None), hub: EventHub::new() })
    }

    /// Restore a previously persisted session without contacting the server.
    #[must_use]
    pub fn with_session(self, session: Session) -> Self {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
        self
    }

    #[must_use]
    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    #[must_use]
    pub fn stored_session(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, session: Option<Session>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// Password grant. Publishes `SIGNED_IN` on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the credentials are rejected.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        let payload = serde_json::json!({ "email": email, "password": password });
        let session = self.token_grant("password", &payload).await?;
        info!(user = ?session.user.as_ref().map(|u| &u.id), "signed in with password");
        self.store(Some(session.clone()));
        self.hub
            .publish(&AuthEvent::new(AuthEventKind::SignedIn, Some(session.clone())));
        Ok(session)
    }

    /// Refresh-token grant. Publishes `TOKEN_REFRESHED` on success.
    ///
    /// # Errors
    ///
    /// Returns `NoSession` without a stored refresh token, or the provider error.
    pub async fn refresh_session(&self) -> Result<Session, ProviderError> {
        let refresh_token = self
            .stored_session()
            .and_then(|s| s.refresh_token)
            .ok_or(ProviderError::NoSession)?;
        let payload = serde_json::json!({ "refresh_token": refresh_token });
        let session = self.token_grant("refresh_token", &payload).await?;
        self.store(Some(session.clone()));
        self.hub
            .publish(&AuthEvent::new(AuthEventKind::TokenRefreshed, Some(session.clone())));
        Ok(session)
    }

    async fn token_grant(&self, grant_type: &str, payload: &serde_json::Value) -> Result<Session, ProviderError> {
        let resp = self
            .http
            .post(token_endpoint(&self.config.url, grant_type))
            .header("apikey", &self.config.anon_key)
            .json(payload)
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(body.into())
    }

    /// Resolve an access token to its user. Rejected tokens yield `None`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an unexpected status.
    pub async fn user_for_token(&self, access_token: &str) -> Result<Option<User>, ProviderError> {
        let resp = self
            .http
            .get(user_endpoint(&self.config.url))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport)?;
        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => resp
                .json::<User>()
                .await
                .map(Some)
                .map_err(|e| ProviderError::Decode(e.to_string())),
            _ => Err(api_error(resp).await),
        }
    }
}

/// Map a refresh attempt to the session lookup result. GoTrue answers a
/// revoked or expired refresh token with `400 invalid_grant`.
fn refreshed_or_cleared(result: Result<Session, ProviderError>) -> Result<Option<Session>, ProviderError> {
    match result {
        Ok(session) => Ok(Some(session)),
        Err(ProviderError::NoSession | ProviderError::Api { status: 400, .. }) => Ok(None),
        Err(e) if e.is_unauthorized() => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait::async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(stored) = self.stored_session() else {
            return Ok(None);
        };
        match self.user_for_token(&stored.access_token).await? {
            Some(user) => {
                let session = Session { user: Some(user), ..stored };
                self.store(Some(session.clone()));
                Ok(Some(session))
            }
            None => {
                info!("stored access token rejected; trying refresh token");
                let refreshed = refreshed_or_cleared(self.refresh_session().await)?;
                if refreshed.is_none() {
                    info!("stored session rejected; session cleared");
                    self.store(None);
                }
                Ok(refreshed)
            }
        }
    }

    fn subscribe(&self) -> Subscription {
        self.hub
            .subscribe_with(AuthEvent::new(AuthEventKind::InitialSession, self.stored_session()))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let previous = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let remote = match previous {
            Some(session) => self.revoke(&session.access_token).await,
            None => Ok(()),
        };
        if let Err(e) = &remote {
            warn!(error = %e, "remote sign-out failed; local session cleared anyway");
        }
        self.hub
            .publish(&AuthEvent::new(AuthEventKind::SignedOut, None));
        remote
    }
}

impl SupabaseAuth {
    async fn revoke(&self, access_token: &str) -> Result<(), ProviderError> {
        let resp = self
            .http
            .post(logout_endpoint(&self.config.url))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport)?;
        // An already-expired token means the session is gone server-side too.
        if resp.status().is_success() || resp.status() == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(api_error(resp).await)
        }
    }
}
