//! Engine error types with HTTP status code mapping.
//!
//! [`EngineError`] is the central error type for the engine. Each variant
//! maps to an error kind string and an HTTP status code, and renders as
//! the standard `{success: false, error, message}` JSON envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::OrderId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "success": false,
///   "error": "not_found",
///   "message": "order 0a1b… not found"
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Always `false` for error responses.
    pub success: bool,
    /// Machine-readable error kind.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Kinds
///
/// | Kind               | HTTP Status               |
/// |--------------------|---------------------------|
/// | Validation         | 400 Bad Request           |
/// | BadRequest         | 400 Bad Request           |
/// | NotFound           | 404 Not Found             |
/// | Conflict           | 409 Conflict              |
/// | ServiceUnavailable | 503 Service Unavailable   |
/// | Internal           | 500 Internal Server Error |
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Request validation failed (bad tokens, amount, slippage, retries).
    #[error("invalid request: {0}")]
    Validation(String),

    /// Order with the given ID was not found.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Operation conflicts with the order's current (terminal) state.
    #[error("order {order_id} is {status}: {reason}")]
    Conflict {
        /// Order in conflict.
        order_id: OrderId,
        /// Current status that caused the conflict.
        status: String,
        /// What was attempted.
        reason: String,
    },

    /// A required downstream service (venue, queue) is unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Client-attributable runtime failure (e.g. slippage exceeded).
    #[error("{0}")]
    BadRequest(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Queue layer failure.
    #[error("queue error: {0}")]
    Queue(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Returns the machine-readable error kind for this variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::OrderNotFound(_) => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::BadRequest(_) => "bad_request",
            Self::Persistence(_) | Self::Queue(_) | Self::Internal(_) => "internal",
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::OrderNotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Persistence(_) | Self::Queue(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            error: self.kind(),
            message: self.to_string(),
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        let err = EngineError::Validation("tokenIn equals tokenOut".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = EngineError::OrderNotFound(OrderId::new());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = EngineError::Conflict {
            order_id: OrderId::new(),
            status: "completed".to_string(),
            reason: "cancel".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn unavailable_maps_to_503() {
        let err = EngineError::ServiceUnavailable("all venues down".to_string());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn internal_kinds_map_to_500() {
        assert_eq!(
            EngineError::Persistence("db down".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            EngineError::Queue("redis down".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(EngineError::Internal("boom".to_string()).kind(), "internal");
    }
}
