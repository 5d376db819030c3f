pub mod draft;
pub mod extraction;
pub mod publish;
pub mod settings;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::warn;

use postrelay_common::RelayError;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({"error": message.into()})),
    )
        .into_response()
}

/// Map a relay error onto a JSON error response.
fn relay_error(err: RelayError) -> Response {
    match err {
        RelayError::Validation(message) => error_response(StatusCode::BAD_REQUEST, message),
        RelayError::NoDraft => error_response(StatusCode::NOT_FOUND, err.to_string()),
        other => {
            warn!(error = %other, "Relay operation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}
