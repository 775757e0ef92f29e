//! Contact route: marketing-site contact and book-a-demo forms.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::services::contact::{ContactError, ContactRequest};
use crate::state::AppState;

pub(crate) fn contact_error_to_status(err: &ContactError) -> StatusCode {
    match err {
        ContactError::InvalidEmail | ContactError::Missing(_) | ContactError::TooLong { .. } => {
            StatusCode::BAD_REQUEST
        }
        ContactError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        ContactError::Delivery(_) => StatusCode::BAD_GATEWAY,
    }
}

fn contact_error_response(err: &ContactError) -> Response {
    (contact_error_to_status(err), Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

/// `POST /api/contact`: validate and forward a form submission.
pub async fn submit(State(state): State<AppState>, Json(body): Json<ContactRequest>) -> Response {
    let Some(mailer) = &state.mailer else {
        return contact_error_response(&ContactError::NotConfigured);
    };
    let message = match body.validate() {
        Ok(m) => m,
        Err(e) => return contact_error_response(&e),
    };
    if let Err(e) = mailer.send(&message).await {
        tracing::error!(error = %e, kind = ?message.kind, "contact delivery failed");
        return contact_error_response(&e);
    }
    tracing::info!(kind = ?message.kind, language = %message.language, "contact request forwarded");
    StatusCode::ACCEPTED.into_response()
}

#[cfg(test)]
#[path = "contact_test.rs"]
mod tests;
