use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use super::*;
use crate::error::ProviderError;
use crate::provider::{AuthEventKind, EventHub, Session, User};

// =============================================================================
// Test doubles
// =============================================================================

struct FakeProvider {
    probe: Mutex<Result<Option<Session>, String>>,
    hub: EventHub,
    emit_initial: bool,
    probes: AtomicUsize,
    /// When set, `current_session` blocks until `release` is called.
    gate: Option<Notify>,
}

impl FakeProvider {
    fn new(probe: Result<Option<Session>, String>) -> Arc<Self> {
        Arc::new(Self { probe: Mutex::new(probe), hub: EventHub::new(), emit_initial: false, probes: AtomicUsize::new(0), gate: None })
    }

    /// Behaves like Supabase: every new subscriber first gets `INITIAL_SESSION`.
    fn emitting_initial(probe: Result<Option<Session>, String>) -> Arc<Self> {
        Arc::new(Self { probe: Mutex::new(probe), hub: EventHub::new(), emit_initial: true, probes: AtomicUsize::new(0), gate: None })
    }

    /// Session lookups hang until the test calls `release`.
    fn gated(probe: Result<Option<Session>, String>) -> Arc<Self> {
        Arc::new(Self {
            probe: Mutex::new(probe),
            hub: EventHub::new(),
            emit_initial: false,
            probes: AtomicUsize::new(0),
            gate: Some(Notify::new()),
        })
    }

    fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    fn current(&self) -> Option<Session> {
        self.probe.lock().unwrap().clone().ok().flatten()
    }

    fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        self.hub.publish(&AuthEvent::new(kind, session));
    }
}

#[async_trait::async_trait]
impl IdentityProvider for FakeProvider {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.probe.lock().unwrap().clone().map_err(ProviderError::Transport)
    }

    fn subscribe(&self) -> Subscription {
        if self.emit_initial {
            self.hub.subscribe_with(AuthEvent::new(AuthEventKind::InitialSession, self.current()))
        } else {
            self.hub.subscribe()
        }
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        *self.probe.lock().unwrap() = Ok(None);
        self.emit(AuthEventKind::SignedOut, None);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNavigator {
    paths: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn replace(&self, path: &str) {
        self.paths.lock().unwrap().push(path.to_owned());
    }
}

fn session(id: &str) -> Session {
    Session {
        access_token: format!("at-{id}"),
        refresh_token: None,
        user: Some(User { id: id.to_owned(), email: None }),
    }
}

fn controller(provider: &Arc<FakeProvider>, navigator: &Arc<RecordingNavigator>) -> SessionController {
    let provider: Arc<dyn IdentityProvider> = provider.clone();
    let navigator: Arc<dyn Navigator> = navigator.clone();
    SessionController::new(provider, navigator)
}

/// Let the controller task drain everything that is ready, well short of the
/// post-login delay.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// =============================================================================
// Mount / unmount
// =============================================================================

#[tokio::test(start_paused = true)]
async fn snapshot_is_loading_until_probe_resolves() {
    let provider = FakeProvider::new(Ok(Some(session("u1"))));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    assert_eq!(ctl.snapshot(), AuthSnapshot::loading());
    let rx = ctl.mount("/analyze");
    assert!(rx.borrow().loading);

    settle().await;
    let snap = rx.borrow().clone();
    assert!(!snap.loading);
    assert_eq!(snap.user.map(|u| u.id), Some("u1".to_owned()));
    assert!(navigator.paths().is_empty());
}

#[tokio::test(start_paused = true)]
async fn double_mount_probes_and_subscribes_once() {
    let provider = FakeProvider::new(Ok(None));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    let _first = ctl.mount("/");
    let _second = ctl.mount("/");
    settle().await;
    let _third = ctl.mount("/");
    settle().await;

    assert_eq!(provider.probes.load(Ordering::SeqCst), 1);
    assert_eq!(provider.hub.subscriber_count(), 1);
    assert!(ctl.is_mounted());
}

#[tokio::test(start_paused = true)]
async fn unmount_releases_subscription_and_allows_remount() {
    let provider = FakeProvider::new(Ok(None));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    ctl.mount("/");
    settle().await;
    assert_eq!(provider.hub.subscriber_count(), 1);

    ctl.unmount().await;
    assert!(!ctl.is_mounted());
    assert_eq!(provider.hub.subscriber_count(), 0);
    assert_eq!(ctl.snapshot(), AuthSnapshot::loading());

    ctl.mount("/");
    settle().await;
    assert_eq!(provider.probes.load(Ordering::SeqCst), 2);
    assert_eq!(provider.hub.subscriber_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn sign_in_during_slow_session_lookup_is_delivered() {
    let provider = FakeProvider::gated(Ok(None));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    let rx = ctl.mount("/login");
    settle().await;
    assert!(rx.borrow().loading);
    assert_eq!(provider.hub.subscriber_count(), 1);

    provider.emit(AuthEventKind::SignedIn, Some(session("u1")));
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(navigator.paths(), vec!["/analyze".to_owned()]);

    // The lookup finally answers "signed out"; the event already won.
    provider.release();
    settle().await;

    let snap = rx.borrow().clone();
    assert!(!snap.loading);
    assert_eq!(snap.user.map(|u| u.id), Some("u1".to_owned()));
    assert_eq!(navigator.paths(), vec!["/analyze".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn unmount_during_slow_session_lookup_releases_subscription() {
    let provider = FakeProvider::gated(Ok(None));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    ctl.mount("/analyze");
    settle().await;
    ctl.unmount().await;

    assert_eq!(provider.hub.subscriber_count(), 0);
    assert!(navigator.paths().is_empty());
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn anonymous_mount_on_protected_path_redirects_to_login() {
    let provider = FakeProvider::new(Ok(None));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    ctl.mount("/my-establishments");
    settle().await;

    assert_eq!(navigator.paths(), vec!["/login".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn french_sign_in_lands_on_analyser_after_delay() {
    let provider = FakeProvider::emitting_initial(Ok(Some(session("u1"))));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    ctl.mount("/connexion");
    settle().await;
    assert!(navigator.paths().is_empty());

    provider.emit(AuthEventKind::SignedIn, Some(session("u1")));
    settle().await;
    assert!(navigator.paths().is_empty(), "redirect must wait for the delay");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(navigator.paths(), vec!["/analyser".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn probe_failure_is_anonymous_and_redirects_without_error() {
    let provider = FakeProvider::new(Err("network unreachable".to_owned()));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    let rx = ctl.mount("/analyze");
    settle().await;

    let snap = rx.borrow().clone();
    assert!(snap.user.is_none());
    assert!(!snap.loading);
    assert_eq!(navigator.paths(), vec!["/login".to_owned()]);
    assert!(ctl.is_mounted());
}

// =============================================================================
// Redirect de-duplication
// =============================================================================

#[tokio::test(start_paused = true)]
async fn second_signed_in_does_not_redirect_again() {
    let provider = FakeProvider::new(Ok(None));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    ctl.mount("/login");
    settle().await;

    provider.emit(AuthEventKind::SignedIn, Some(session("u1")));
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(navigator.paths(), vec!["/analyze".to_owned()]);

    ctl.path_changed("/login");
    settle().await;
    provider.emit(AuthEventKind::SignedIn, Some(session("u1")));
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(navigator.paths(), vec!["/analyze".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn signed_out_rearms_login_redirect() {
    let provider = FakeProvider::new(Ok(None));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    ctl.mount("/signup");
    settle().await;
    provider.emit(AuthEventKind::SignedIn, Some(session("u1")));
    tokio::time::sleep(Duration::from_millis(600)).await;

    // User signs out from the dashboard and is sent back to login.
    provider.sign_out().await.unwrap();
    settle().await;
    assert_eq!(navigator.paths(), vec!["/analyze".to_owned(), "/login".to_owned()]);

    provider.emit(AuthEventKind::SignedIn, Some(session("u1")));
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(
        navigator.paths(),
        vec!["/analyze".to_owned(), "/login".to_owned(), "/analyze".to_owned()]
    );
}

#[tokio::test(start_paused = true)]
async fn signed_in_off_auth_page_does_not_navigate() {
    let provider = FakeProvider::new(Ok(Some(session("u1"))));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    ctl.mount("/about");
    settle().await;
    provider.emit(AuthEventKind::SignedIn, Some(session("u1")));
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(navigator.paths().is_empty());
}

#[tokio::test(start_paused = true)]
async fn protected_rerenders_redirect_once() {
    let provider = FakeProvider::new(Ok(None));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    ctl.mount("/analyze");
    settle().await;
    ctl.path_changed("/analyze");
    ctl.path_changed("/account");
    settle().await;

    assert_eq!(navigator.paths(), vec!["/login".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn duplicate_initial_session_updates_state_without_redirect() {
    let provider = FakeProvider::emitting_initial(Ok(None));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    let rx = ctl.mount("/analyze");
    settle().await;
    assert_eq!(navigator.paths(), vec!["/login".to_owned()]);

    provider.emit(AuthEventKind::InitialSession, Some(session("u9")));
    settle().await;
    assert_eq!(rx.borrow().user.as_ref().map(|u| u.id.as_str()), Some("u9"));

    provider.emit(AuthEventKind::InitialSession, None);
    settle().await;
    assert!(rx.borrow().user.is_none());
    assert_eq!(navigator.paths(), vec!["/login".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn unmount_drops_pending_post_login_redirect() {
    let provider = FakeProvider::new(Ok(None));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    ctl.mount("/login");
    settle().await;
    provider.emit(AuthEventKind::SignedIn, Some(session("u1")));
    settle().await;
    ctl.unmount().await;

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(navigator.paths().is_empty());
}

#[tokio::test(start_paused = true)]
async fn closed_event_stream_keeps_controller_running() {
    let provider = FakeProvider::new(Ok(None));
    let navigator = Arc::new(RecordingNavigator::default());
    let mut ctl = controller(&provider, &navigator);

    let rx = ctl.mount("/");
    settle().await;
    provider.hub.close();
    settle().await;
    assert!(!rx.borrow().loading);
    assert!(ctl.is_mounted());

    ctl.path_changed("/account");
    settle().await;
    assert_eq!(navigator.paths(), vec!["/login".to_owned()]);
}
