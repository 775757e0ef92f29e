//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! Every external dependency sits behind a trait object (`TokenVerifier`,
//! `UsageSource`, `Mailer`) so route tests can swap in doubles without a
//! network.

use std::sync::Arc;

use session::supabase::SupabaseAuth;
use session::{ProviderError, User};

use crate::config::AppConfig;
use crate::services::backoffice::BackofficeAuth;
use crate::services::contact::{Mailer, ResendMailer};
use crate::services::usage::{SupabaseUsage, UsageCache, UsageService};

/// Resolves a bearer access token to its user.
#[async_trait::async_trait]
pub trait TokenVerifier: Send + Sync {
    /// `Ok(None)` for a token the provider rejects.
    async fn verify(&self, access_token: &str) -> Result<Option<User>, ProviderError>;
}

#[async_trait::async_trait]
impl TokenVerifier for SupabaseAuth {
    async fn verify(&self, access_token: &str) -> Result<Option<User>, ProviderError> {
        self.user_for_token(access_token).await
    }
}

/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<dyn TokenVerifier>,
    pub usage: Arc<UsageService>,
    pub backoffice: BackofficeAuth,
    /// `None` when Resend is not configured; the contact route answers 503.
    pub mailer: Option<Arc<dyn Mailer>>,
    pub cookie_secure: bool,
}

impl AppState {
    /// Wire production dependencies from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the Supabase HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let tokens = SupabaseAuth::new(config.supabase.clone())?;
        let source = SupabaseUsage::new(&config.supabase.url, config.service_role_key.clone(), config.usage_table.clone());
        let usage = UsageService::new(
            Arc::new(source),
            UsageCache::new(config.usage_cache_ttl),
            config.usage_monthly_limit,
        );
        let mailer = config.contact.as_ref().map(|c| {
            Arc::new(ResendMailer::new(&c.resend_api_key, c.from.clone(), c.to.clone())) as Arc<dyn Mailer>
        });
        Ok(Self {
            tokens: Arc::new(tokens),
            usage: Arc::new(usage),
            backoffice: BackofficeAuth::new(config.backoffice_password.as_deref(), config.backoffice_session_ttl),
            mailer,
            cookie_secure: config.cookie_secure,
        })
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::services::contact::{ContactError, ContactMessage};
    use crate::services::usage::{UsageError, UsageSource};

    pub const TEST_PASSWORD: &str = "hunter2";

    /// Accepts `token-<user id>` and rejects everything else.
    pub struct FakeTokens;

    #[async_trait::async_trait]
    impl TokenVerifier for FakeTokens {
        async fn verify(&self, access_token: &str) -> Result<Option<User>, ProviderError> {
            if access_token == "token-broken" {
                return Err(ProviderError::Transport("connection reset".into()));
            }
            Ok(access_token
                .strip_prefix("token-")
                .map(|id| User { id: id.to_owned(), email: None }))
        }
    }

    /// In-memory usage rows keyed by user id.
    #[derive(Default)]
    pub struct MemoryUsage {
        pub counts: Mutex<HashMap<String, u64>>,
    }

    #[async_trait::async_trait]
    impl UsageSource for MemoryUsage {
        async fn count_since(&self, user_id: &str, _since: &str) -> Result<u64, UsageError> {
            Ok(self.counts.lock().unwrap().get(user_id).copied().unwrap_or(0))
        }

        async fn record(&self, user_id: &str) -> Result<(), UsageError> {
            *self.counts.lock().unwrap().entry(user_id.to_owned()).or_default() += 1;
            Ok(())
        }
    }

    /// Records sent messages; fails every send when `fail` is set.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<ContactMessage>>,
        pub fail: bool,
    }

    #[async_trait::async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &ContactMessage) -> Result<(), ContactError> {
            if self.fail {
                return Err(ContactError::Delivery("resend unavailable".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    /// State with fake token verification, in-memory usage (limit 3) and no mailer.
    #[must_use]
    pub fn test_app_state() -> AppState {
        test_app_state_with(Arc::new(MemoryUsage::default()), None)
    }

    #[must_use]
    pub fn test_app_state_with(usage: Arc<MemoryUsage>, mailer: Option<Arc<dyn Mailer>>) -> AppState {
        AppState {
            tokens: Arc::new(FakeTokens),
            usage: Arc::new(UsageService::new(usage, UsageCache::new(Duration::from_secs(60)), 3)),
            backoffice: BackofficeAuth::new(Some(TEST_PASSWORD), Duration::from_secs(60)),
            mailer,
            cookie_secure: false,
        }
    }
}
