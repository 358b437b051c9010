use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use stockroom_auth::{AuthzError, PasswordError, TokenValidationError};
use stockroom_infra::command_dispatcher::DispatchError;
use stockroom_infra::constraints::ConstraintError;
use stockroom_infra::projections::ProjectionError;

use crate::app::dto::Envelope;

/// Every failure a handler can return, already classified by HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    /// Logged in full, reported to the client as a generic message.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn not_found(subject: &str) -> Self {
        ApiError::NotFound(format!("{subject} not found"))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal(msg.into())
    }

    /// Map a dispatch failure, naming `subject` in not-found messages.
    pub fn from_dispatch(err: DispatchError, subject: &str) -> Self {
        match err {
            DispatchError::Validation(msg) => ApiError::BadRequest(msg),
            DispatchError::InsufficientStock { available, requested } => ApiError::BadRequest(format!(
                "Insufficient stock. Available: {available}, requested: {requested}"
            )),
            DispatchError::InvariantViolation(msg) => ApiError::Unprocessable(msg),
            DispatchError::Conflict(msg) => ApiError::Conflict(msg),
            DispatchError::Concurrency(_) => {
                ApiError::Conflict(format!("{subject} was modified concurrently, please retry"))
            }
            DispatchError::Unauthorized => ApiError::Forbidden("Insufficient permissions".to_string()),
            DispatchError::NotFound => ApiError::not_found(subject),
            DispatchError::Deserialize(_) | DispatchError::Store(_) | DispatchError::Publish(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError::from_dispatch(err, "Resource")
    }
}

impl From<ConstraintError> for ApiError {
    fn from(err: ConstraintError) -> Self {
        match err {
            ConstraintError::UniqueViolation { .. } | ConstraintError::Referenced { .. } => {
                ApiError::Conflict(err.to_string())
            }
            ConstraintError::MissingParent(_) => ApiError::BadRequest(err.to_string()),
            ConstraintError::Unavailable(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Weak(msg) => ApiError::BadRequest(format!("Password {msg}")),
            PasswordError::Crypto(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<TokenValidationError> for ApiError {
    fn from(err: TokenValidationError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("blocking task failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, axum::Json(Envelope::<()>::failure(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_statuses() {
        let cases = [
            (DispatchError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                DispatchError::InsufficientStock { available: 1, requested: 2 },
                StatusCode::BAD_REQUEST,
            ),
            (DispatchError::InvariantViolation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (DispatchError::Conflict("x".into()), StatusCode::CONFLICT),
            (DispatchError::Concurrency("x".into()), StatusCode::CONFLICT),
            (DispatchError::Unauthorized, StatusCode::FORBIDDEN),
            (DispatchError::NotFound, StatusCode::NOT_FOUND),
            (DispatchError::Publish("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn not_found_names_the_subject() {
        let err = ApiError::from_dispatch(DispatchError::NotFound, "Product");
        assert_eq!(err.to_string(), "Product not found");
    }

    #[test]
    fn insufficient_stock_reports_both_quantities() {
        let err = ApiError::from(DispatchError::InsufficientStock { available: 3, requested: 5 });
        assert_eq!(err.to_string(), "Insufficient stock. Available: 3, requested: 5");
    }

    #[test]
    fn constraint_errors_map_to_statuses() {
        let taken = ConstraintError::UniqueViolation { index: "sku", key: "a".into() };
        assert_eq!(ApiError::from(taken).status(), StatusCode::CONFLICT);

        let missing = ConstraintError::MissingParent(stockroom_core::AggregateId::new());
        assert_eq!(ApiError::from(missing).status(), StatusCode::BAD_REQUEST);
    }
}
