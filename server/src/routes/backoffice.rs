//! Backoffice routes: password login, session probe, logout.

use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;

use crate::services::backoffice::{BackofficeError, COOKIE_NAME};
use crate::state::AppState;

fn session_cookie(value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

// =============================================================================
// ADMIN EXTRACTOR
// =============================================================================

/// Operator holding a live backoffice session cookie.
pub struct BackofficeAdmin;

impl<S> axum::extract::FromRequestParts<S> for BackofficeAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(COOKIE_NAME).map(Cookie::value).unwrap_or_default();
        if token.is_empty() {
            return Err(StatusCode::UNAUTHORIZED);
        }

        let app_state = AppState::from_ref(state);
        if !app_state.backoffice.validate(token) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(Self)
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    password: String,
}

/// `POST /backoffice/login`: check the password, set the session cookie.
pub async fn login(State(state): State<AppState>, jar: CookieJar, axum::Json(body): axum::Json<LoginRequest>) -> Response {
    match state.backoffice.login(&body.password) {
        Ok(token) => {
            let max_age = Duration::try_from(state.backoffice.ttl()).unwrap_or(Duration::MAX);
            let jar = jar.add(session_cookie(token, max_age, state.cookie_secure));
            (jar, StatusCode::NO_CONTENT).into_response()
        }
        Err(BackofficeError::InvalidPassword) => (StatusCode::UNAUTHORIZED, "invalid password").into_response(),
        Err(BackofficeError::Disabled) => {
            (StatusCode::SERVICE_UNAVAILABLE, "backoffice login not configured").into_response()
        }
    }
}

/// `GET /backoffice/session`: `204` while the cookie is valid.
pub async fn session(_admin: BackofficeAdmin) -> StatusCode {
    StatusCode::NO_CONTENT
}

/// `POST /backoffice/logout`: revoke the token, clear the cookie.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(cookie) = jar.get(COOKIE_NAME) {
        state.backoffice.revoke(cookie.value());
        tracing::info!(active = state.backoffice.active_sessions(), "backoffice session revoked");
    }
    let jar = jar.add(session_cookie(String::new(), Duration::ZERO, state.cookie_secure));
    (jar, StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "backoffice_test.rs"]
mod tests;
