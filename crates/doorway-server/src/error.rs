//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use doorway_core::error::DoorwayError;

/// Error returned by handlers and extractors.
#[derive(Debug)]
pub enum ApiError {
    /// A domain or storage failure.
    Doorway(DoorwayError),
    /// The request needs a signed-in identity.
    Unauthenticated,
    /// The anti-forgery token is missing or does not match.
    Forbidden,
}

impl From<DoorwayError> for ApiError {
    fn from(err: DoorwayError) -> Self {
        ApiError::Doorway(err)
    }
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "sign in required".into()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "invalid authenticity token".into()),
            // Never say why a link was refused.
            ApiError::Doorway(DoorwayError::AuthenticationFailed { .. }) => (
                StatusCode::UNAUTHORIZED,
                "That sign-in link is invalid or has expired.".into(),
            ),
            ApiError::Doorway(DoorwayError::RateLimited) => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many sign-in requests. Try again later.".into(),
            ),
            ApiError::Doorway(DoorwayError::NotFound { entity, .. }) => {
                (StatusCode::NOT_FOUND, format!("{entity} not found"))
            }
            ApiError::Doorway(DoorwayError::Validation { message }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, message.clone())
            }
            ApiError::Doorway(DoorwayError::AlreadyExists { entity }) => {
                (StatusCode::CONFLICT, format!("{entity} already exists"))
            }
            ApiError::Doorway(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let body = serde_json::json!({
            "error": {
                "status": status.as_u16(),
                "message": message,
            }
        });
        (status, Json(body)).into_response()
    }
}
