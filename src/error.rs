use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::booking::BookingError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Username or password is incorrect".into())
    }

    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::BadRequest("VALIDATION_ERROR", message.into())
    }

    pub fn db(e: sqlx::Error) -> Self {
        ApiError::Internal(format!("db error: {e}"))
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        let code = e.code();
        match e {
            BookingError::SlotTaken | BookingError::DuplicateReview => {
                ApiError::Conflict(code, e.to_string())
            }
            BookingError::PermissionDenied(_) => ApiError::Forbidden(code, e.to_string()),
            BookingError::NotFound(_) => ApiError::NotFound(code, e.to_string()),
            BookingError::Storage(msg) => {
                tracing::error!(error = %msg, "booking storage failure");
                ApiError::Internal(format!("db error: {msg}"))
            }
            _ => ApiError::BadRequest(code, e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Forbidden(code, msg) => {
                (StatusCode::FORBIDDEN, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::to_error_response("INTERNAL", &msg),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::booking::AppointmentStatus;

    fn status_of(e: BookingError) -> StatusCode {
        ApiError::from(e).into_response().status()
    }

    #[test]
    fn booking_errors_map_to_http_statuses() {
        assert_eq!(status_of(BookingError::SlotTaken), StatusCode::CONFLICT);
        assert_eq!(status_of(BookingError::DuplicateReview), StatusCode::CONFLICT);
        assert_eq!(status_of(BookingError::PermissionDenied("no")), StatusCode::FORBIDDEN);
        assert_eq!(status_of(BookingError::NotFound("doctor")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(BookingError::Storage("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_of(BookingError::PastDate), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(BookingError::FileTooLarge), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(BookingError::InvalidTransition {
                from: AppointmentStatus::Canceled,
                to: AppointmentStatus::Canceled,
            }),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn conversion_keeps_machine_code_and_message() {
        assert_matches!(
            ApiError::from(BookingError::SlotTaken),
            ApiError::Conflict("SLOT_TAKEN", msg) if msg.contains("already taken")
        );
        assert_matches!(
            ApiError::from(BookingError::OutsideHours),
            ApiError::BadRequest("OUTSIDE_HOURS", _)
        );
    }
}
