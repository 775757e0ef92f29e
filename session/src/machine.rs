//! Session lifecycle state machine.
//!
//! DESIGN
//! ======
//! `SessionMachine` is synchronous and side-effect free: every input (probe
//! result, auth event, path change) returns the navigations it wants, and the
//! controller task performs them. Lifecycle is a `Phase` enum, so probing
//! twice or gating before the probe resolves cannot be expressed.
//!
//! INVARIANTS
//! ==========
//! - `loading` is `phase != Ready`; `Ready` is only left through `reset`.
//! - A redirect is issued only when its `RedirectKey` differs from the last
//!   one recorded, so each (language, kind) pair fires at most once until a
//!   `SIGNED_OUT` clears the guard.

#[cfg(test)]
#[path = "machine_test.rs"]
mod tests;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::SessionConfig;
use crate::error::ProviderError;
use crate::paths::{Language, PathClassifier};
use crate::provider::{AuthEvent, AuthEventKind, Session, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Probing,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    Login,
    Logout,
}

impl RedirectKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
        }
    }
}

/// De-duplication token for one redirect decision, rendered `{language}-{kind}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectKey {
    pub language: Language,
    pub kind: RedirectKind,
}

impl fmt::Display for RedirectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.language, self.kind.as_str())
    }
}

/// Last redirect taken, plus the marker appended once `INITIAL_SESSION` is seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RedirectGuard {
    key: Option<RedirectKey>,
    initial_seen: bool,
}

impl RedirectGuard {
    #[must_use]
    pub fn key(&self) -> Option<RedirectKey> {
        self.key
    }

    #[must_use]
    pub fn initial_seen(&self) -> bool {
        self.initial_seen
    }

    /// Rendered tag, e.g. `fr-login-initial`.
    #[must_use]
    pub fn tag(&self) -> Option<String> {
        match (self.key, self.initial_seen) {
            (None, false) => None,
            (None, true) => Some("initial".to_owned()),
            (Some(key), false) => Some(key.to_string()),
            (Some(key), true) => Some(format!("{key}-initial")),
        }
    }

    /// Record `key`; false when it is already the last redirect taken.
    fn claim(&mut self, key: RedirectKey) -> bool {
        if self.key == Some(key) {
            return false;
        }
        self.key = Some(key);
        true
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Navigation requested by the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Replace the current route now.
    Replace(String),
    /// Replace the current route once `delay` has elapsed.
    ReplaceAfter { path: String, delay: Duration },
}

/// What UI code reads: who is signed in, and whether that is known yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSnapshot {
    pub user: Option<User>,
    pub loading: bool,
}

impl AuthSnapshot {
    #[must_use]
    pub fn loading() -> Self {
        Self { user: None, loading: true }
    }
}

pub struct SessionMachine {
    classifier: Arc<dyn PathClassifier>,
    config: SessionConfig,
    phase: Phase,
    user: Option<User>,
    path: String,
    guard: RedirectGuard,
}

impl SessionMachine {
    #[must_use]
    pub fn new(classifier: Arc<dyn PathClassifier>, config: SessionConfig, path: impl Into<String>) -> Self {
        Self {
            classifier,
            config,
            phase: Phase::Uninitialized,
            user: None,
            path: path.into(),
            guard: RedirectGuard::default(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.phase != Phase::Ready
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn guard(&self) -> RedirectGuard {
        self.guard
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot { user: self.user.clone(), loading: self.loading() }
    }

    /// Enter `Probing`. Returns false if startup already ran for this mount.
    pub fn begin(&mut self) -> bool {
        if self.phase != Phase::Uninitialized {
            return false;
        }
        self.phase = Phase::Probing;
        true
    }

    /// Apply the initial session probe. Errors resolve to "signed out".
    ///
    /// Results arriving outside `Probing` are stale and dropped.
    pub fn probe_resolved(&mut self, result: Result<Option<Session>, ProviderError>) -> Vec<Effect> {
        if self.phase != Phase::Probing {
            tracing::debug!(phase = ?self.phase, "stale session probe result discarded");
            return Vec::new();
        }
        self.user = match result {
            Ok(session) => session.and_then(|s| s.user),
            Err(e) => {
                tracing::warn!(error = %e, "initial session probe failed; treating as signed out");
                None
            }
        };
        self.phase = Phase::Ready;
        self.gate().into_iter().collect()
    }

    /// Apply one auth event from the provider stream.
    pub fn handle_event(&mut self, event: AuthEvent) -> Vec<Effect> {
        let AuthEvent { kind, session } = event;
        self.user = session.and_then(|s| s.user);
        self.phase = Phase::Ready;

        let mut effects = Vec::new();
        if kind == AuthEventKind::InitialSession && self.guard.initial_seen {
            tracing::debug!(guard = ?self.guard.tag(), "repeated INITIAL_SESSION; state updated only");
        } else {
            match kind {
                AuthEventKind::SignedIn if self.user.is_some() => effects.extend(self.login_redirect()),
                AuthEventKind::SignedOut => self.guard.clear(),
                AuthEventKind::InitialSession => self.guard.initial_seen = true,
                _ => {}
            }
        }
        effects.extend(self.gate());
        effects
    }

    /// The current path changed (router navigation or our own redirect).
    pub fn navigated(&mut self, path: impl Into<String>) -> Vec<Effect> {
        self.path = path.into();
        self.gate().into_iter().collect()
    }

    /// Teardown: forget everything so a later mount starts from scratch.
    pub fn reset(&mut self) {
        self.phase = Phase::Uninitialized;
        self.user = None;
        self.guard.clear();
    }

    fn login_redirect(&mut self) -> Option<Effect> {
        let language = self.classifier.language_of(&self.path);
        let key = RedirectKey { language, kind: RedirectKind::Login };
        if !self.classifier.is_auth_form(&self.path) || !self.guard.claim(key) {
            return None;
        }
        let path = self.classifier.route_path(self.config.landing, language);
        tracing::info!(%key, from = %self.path, to = %path, "post-login redirect scheduled");
        Some(Effect::ReplaceAfter { path, delay: self.config.redirect_delay })
    }

    /// Route-gating pass: anonymous visitors of protected paths go to login.
    fn gate(&mut self) -> Option<Effect> {
        if self.loading() || self.user.is_some() || self.classifier.is_public(&self.path) {
            return None;
        }
        let language = self.classifier.language_of(&self.path);
        let key = RedirectKey { language, kind: RedirectKind::Logout };
        if !self.guard.claim(key) {
            return None;
        }
        let path = self.classifier.route_path(self.config.login, language);
        tracing::info!(%key, from = %self.path, to = %path, "anonymous visitor redirected to login");
        Some(Effect::Replace(path))
    }
}
