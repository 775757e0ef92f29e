//! Identity-provider seam: sessions, auth events and subscriptions.
//!
//! ARCHITECTURE
//! ============
//! Providers push auth events into an `EventHub`; each subscriber owns a
//! `Subscription` mailbox it drains at its own pace. Dropping the mailbox
//! unsubscribes, so a controller that exits can never leave a live listener
//! behind.

#[cfg(test)]
#[path = "provider_test.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;

/// Authenticated user as reported by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Provider session. The user may be absent on partially-hydrated sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    #[must_use]
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }

    /// User carried by the event's session, if any.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().and_then(|s| s.user.as_ref())
    }
}

/// Session store plus auth-event stream.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Probe the current session.
    async fn current_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Open a new event mailbox.
    fn subscribe(&self) -> Subscription;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), ProviderError>;
}

// =============================================================================
// EVENT HUB
// =============================================================================

#[derive(Default)]
struct HubInner {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<AuthEvent>>,
}

/// Fan-out of auth events to every live subscription.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
}

impl EventHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, tx);
        Subscription { id, rx, hub: Arc::downgrade(&self.inner) }
    }

    /// Register a subscriber and queue `initial` as its first event.
    #[must_use]
    pub fn subscribe_with(&self, initial: AuthEvent) -> Subscription {
        let subscription = self.subscribe();
        if let Some(tx) = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .get(&subscription.id)
        {
            let _ = tx.send(initial);
        }
        subscription
    }

    /// Deliver `event` to every subscriber, pruning closed mailboxes.
    pub fn publish(&self, event: &AuthEvent) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
        tracing::debug!(kind = ?event.kind, subscribers = inner.subscribers.len(), "auth event published");
    }

    /// Drop every subscriber; their `recv` then yields `None`.
    pub fn close(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .clear();
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }
}

/// Receiving end of an auth-event subscription.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<AuthEvent>,
    hub: Weak<Mutex<HubInner>>,
}

impl Subscription {
    /// Wait for the next event. `None` once the provider is gone.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        self.rx.recv().await
    }

    /// Explicit unsubscribe; equivalent to dropping.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .subscribers
                .remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish_non_exhaustive()
    }
}
