//! Usage routes: monthly analysis quota for the signed-in user.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::routes::auth::AuthUser;
use crate::services::usage::{UsageError, UsageReport};
use crate::state::AppState;

pub(crate) fn usage_error_to_status(err: &UsageError) -> StatusCode {
    match err {
        UsageError::LimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
        UsageError::Store(_) | UsageError::StoreStatus { .. } | UsageError::BadCount(_) => StatusCode::BAD_GATEWAY,
    }
}

fn usage_error_response(err: &UsageError) -> Response {
    let status = usage_error_to_status(err);
    if status.is_server_error() {
        tracing::error!(error = %err, "usage store request failed");
    }
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

/// `GET /api/usage`: current-month usage for the caller.
pub async fn get_usage(State(state): State<AppState>, auth: AuthUser) -> Result<Json<UsageReport>, Response> {
    state
        .usage
        .report(&auth.user.id)
        .await
        .map(Json)
        .map_err(|e| usage_error_response(&e))
}

/// `POST /api/usage`: record one analysis; `429` once the month's quota is used.
pub async fn record_usage(State(state): State<AppState>, auth: AuthUser) -> Result<Json<UsageReport>, Response> {
    state
        .usage
        .record(&auth.user.id)
        .await
        .map(Json)
        .map_err(|e| usage_error_response(&e))
}

#[cfg(test)]
#[path = "usage_test.rs"]
mod tests;
