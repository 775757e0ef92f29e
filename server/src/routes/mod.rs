//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The dashboard and marketing site are static front-ends talking to Supabase
//! directly; this router carries only the server-side pieces: the usage
//! quota, the backoffice login, the contact forms and a health probe.

pub mod auth;
pub mod backoffice;
pub mod contact;
pub mod usage;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/usage", get(usage::get_usage).post(usage::record_usage))
        .route("/api/contact", post(contact::submit))
        .route("/backoffice/login", post(backoffice::login))
        .route("/backoffice/session", get(backoffice::session))
        .route("/backoffice/logout", post(backoffice::logout))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
