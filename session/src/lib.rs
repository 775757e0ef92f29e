//! # session
//!
//! Client session lifecycle for the Allside dashboard: the authenticated-user
//! state, the identity-provider event stream it follows, and the one-shot
//! login/logout redirects it arbitrates.
//!
//! SYSTEM CONTEXT
//! ==============
//! `machine` is the pure state machine, `controller` drives it from a tokio
//! task, `provider` defines the identity-provider seam (with `supabase` as the
//! production implementation), and `paths` is the static EN/FR route table the
//! redirects are localized against.

pub mod config;
pub mod controller;
pub mod error;
pub mod machine;
pub mod paths;
pub mod provider;
pub mod supabase;

pub use config::SessionConfig;
pub use controller::{AuthSnapshot, Navigator, SessionController};
pub use error::ProviderError;
pub use paths::{Language, PathClassifier, Route, StaticRoutes};
pub use provider::{AuthEvent, AuthEventKind, EventHub, IdentityProvider, Session, Subscription, User};
