//! Mapping from core error kinds to HTTP responses.
//!
//! The boundary owns status codes and safe messages; internals and PII
//! never reach a response body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use lexrag::LexError;

/// Error wrapper implementing `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub LexError);

impl From<LexError> for ApiError {
    fn from(err: LexError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            LexError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            LexError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            LexError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            LexError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, self.0.to_string())
            }
            LexError::QuotaOrRate(_) => (StatusCode::TOO_MANY_REQUESTS, self.0.to_string()),
            LexError::ExternalUnavailable { service, .. } => {
                tracing::error!(error = %self.0, "dependency failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    format!("{service} temporarily unavailable"),
                )
            }
            LexError::PiiLeakage { .. } => {
                tracing::error!("request aborted by PII leakage gate");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PII protection failed".to_string(),
                )
            }
            LexError::Cache(_) | LexError::Internal(_) => {
                tracing::error!(error = %self.0, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: LexError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn status_mapping_follows_error_kind() {
        assert_eq!(
            status_of(LexError::validation("bad uuid")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(LexError::not_found("doc")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(LexError::Conflict("dup".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(LexError::QuotaOrRate("tokens".into())),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(LexError::PiiLeakage { context: "query" }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(LexError::external("vector-store", "down")),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let response = ApiError(LexError::Internal("secret stack trace".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // Body is the generic message only; the detail stays in the logs.
    }
}
