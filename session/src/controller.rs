//! Session lifecycle controller.
//!
//! ARCHITECTURE
//! ============
//! `mount` spawns one task that owns a `SessionMachine` and drains its
//! sources through `tokio::select!`: the initial session lookup, path changes
//! from the host router, the provider's auth-event subscription, and at most
//! one pending delayed redirect. UI code reads `AuthSnapshot` values from a
//! `watch` channel.
//!
//! The subscription is opened before the session lookup starts, so events
//! published while the lookup is in flight are delivered. Whichever settles
//! first moves the machine to `Ready`; a lookup that resolves afterwards is
//! discarded by the machine.
//!
//! TRADE-OFFS
//! ==========
//! The post-login redirect waits a fixed delay instead of a storage-commit
//! acknowledgment, because the provider exposes none. Unmounting drops the
//! pending redirect along with the task.

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::ProviderError;
use crate::machine::{Effect, SessionMachine};
pub use crate::machine::AuthSnapshot;
use crate::paths::{PathClassifier, StaticRoutes};
use crate::provider::{AuthEvent, IdentityProvider, Session, Subscription};

/// Host router. `replace` navigates without adding a history entry.
pub trait Navigator: Send + Sync {
    fn replace(&self, path: &str);
}

enum Command {
    PathChanged(String),
}

struct Mounted {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<AuthSnapshot>,
    task: JoinHandle<()>,
}

type SessionLookup<'a> = Pin<Box<dyn Future<Output = Result<Option<Session>, ProviderError>> + Send + 'a>>;

struct PendingRedirect {
    path: String,
    deadline: Instant,
}

/// Owns the signed-in user for one tab and applies login/logout redirects.
pub struct SessionController {
    provider: Arc<dyn IdentityProvider>,
    navigator: Arc<dyn Navigator>,
    classifier: Arc<dyn PathClassifier>,
    config: SessionConfig,
    mounted: Option<Mounted>,
}

impl SessionController {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            provider,
            navigator,
            classifier: Arc::new(StaticRoutes),
            config: SessionConfig::default(),
            mounted: None,
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn PathClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the lifecycle on `path`. Must be called inside a tokio runtime.
    ///
    /// Mounting an already-mounted controller is a no-op that hands back the
    /// existing snapshot receiver; no second probe or subscription is made.
    pub fn mount(&mut self, path: impl Into<String>) -> watch::Receiver<AuthSnapshot> {
        if let Some(mounted) = &self.mounted {
            if !mounted.task.is_finished() {
                debug!("session controller already mounted");
                return mounted.snapshot.clone();
            }
        }

        let path = path.into();
        info!(%path, "session controller mounted");
        let machine = SessionMachine::new(Arc::clone(&self.classifier), self.config, path);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(AuthSnapshot::loading());
        let task = tokio::spawn(run(
            Arc::clone(&self.provider),
            Arc::clone(&self.navigator),
            machine,
            commands_rx,
            snapshot_tx,
        ));
        self.mounted = Some(Mounted { commands: commands_tx, snapshot: snapshot_rx.clone(), task });
        snapshot_rx
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted.as_ref().is_some_and(|m| !m.task.is_finished())
    }

    /// Report a navigation done by the host router.
    pub fn path_changed(&self, path: impl Into<String>) {
        if let Some(mounted) = &self.mounted {
            let _ = mounted.commands.send(Command::PathChanged(path.into()));
        }
    }

    /// Latest published state; `loading` when not mounted.
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.mounted
            .as_ref()
            .map_or_else(AuthSnapshot::loading, |m| m.snapshot.borrow().clone())
    }

    /// Tear down: close the mailbox, wait for the task to release its
    /// subscription, and allow a fresh `mount` afterwards.
    pub async fn unmount(&mut self) {
        let Some(Mounted { commands, task, .. }) = self.mounted.take() else {
            return;
        };
        drop(commands);
        if let Err(e) = task.await {
            warn!(error = %e, "session controller task ended abnormally");
        }
        info!("session controller unmounted");
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(mounted) = self.mounted.take() {
            mounted.task.abort();
        }
    }
}

async fn run(
    provider: Arc<dyn IdentityProvider>,
    navigator: Arc<dyn Navigator>,
    mut machine: SessionMachine,
    mut commands: mpsc::UnboundedReceiver<Command>,
    snapshot: watch::Sender<AuthSnapshot>,
) {
    if !machine.begin() {
        return;
    }
    let mut pending: Option<PendingRedirect> = None;

    let mut events = Some(provider.subscribe());
    let mut lookup: Option<SessionLookup<'_>> = Some(provider.current_session());

    loop {
        let deadline = pending.as_ref().map_or_else(Instant::now, |p| p.deadline);
        tokio::select! {
            result = next_lookup(&mut lookup) => {
                lookup = None;
                let effects = machine.probe_resolved(result);
                apply(effects, &mut machine, navigator.as_ref(), &mut pending);
            }
            command = commands.recv() => {
                let Some(Command::PathChanged(path)) = command else {
                    break;
                };
                let effects = machine.navigated(path);
                apply(effects, &mut machine, navigator.as_ref(), &mut pending);
            }
            event = next_event(&mut events) => {
                match event {
                    Some(event) => {
                        debug!(kind = ?event.kind, "auth event received");
                        let effects = machine.handle_event(event);
                        apply(effects, &mut machine, navigator.as_ref(), &mut pending);
                    }
                    None => {
                        warn!("auth event stream closed");
                        events = None;
                    }
                }
            }
            () = tokio::time::sleep_until(deadline), if pending.is_some() => {
                if let Some(redirect) = pending.take() {
                    let effects = vec![Effect::Replace(redirect.path)];
                    apply(effects, &mut machine, navigator.as_ref(), &mut pending);
                }
            }
        }
        snapshot.send_replace(machine.snapshot());
    }

    drop(lookup);
    // Dropping the subscription unsubscribes from the provider.
    drop(events);
    machine.reset();
}

async fn next_lookup(lookup: &mut Option<SessionLookup<'_>>) -> Result<Option<Session>, ProviderError> {
    match lookup {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn next_event(events: &mut Option<Subscription>) -> Option<AuthEvent> {
    match events {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

/// Perform navigations, feeding each new path back into the machine.
fn apply(
    effects: Vec<Effect>,
    machine: &mut SessionMachine,
    navigator: &dyn Navigator,
    pending: &mut Option<PendingRedirect>,
) {
    let mut queue = VecDeque::from(effects);
    while let Some(effect) = queue.pop_front() {
        match effect {
            Effect::Replace(path) => {
                info!(%path, "route replaced");
                navigator.replace(&path);
                queue.extend(machine.navigated(path));
            }
            Effect::ReplaceAfter { path, delay } => {
                debug!(%path, delay_ms = delay.as_millis(), "redirect deferred");
                *pending = Some(PendingRedirect { path, deadline: Instant::now() + delay });
            }
        }
    }
}
