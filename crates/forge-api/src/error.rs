//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps lifecycle and validation errors to HTTP status codes and JSON error
//! bodies with a machine-readable code, a message, and optional details.
//! Internal error messages are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forge_core::ValidationError;
use forge_lifecycle::{RegistrationError, TransitionError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "STALE_STATE", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Structured context, present for stale-state and illegal-transition errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Route-level resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Governed entity does not exist (404).
    #[error("{0}")]
    EntityNotFound(String),

    /// Caller's expected state no longer matches (409).
    #[error("{message}")]
    StaleState {
        message: String,
        expected_from_state: String,
        actual_state: String,
    },

    /// Requested edge is not in the transition table (422).
    #[error("{message}")]
    IllegalTransition {
        message: String,
        current_state: String,
        legal_next_states: Vec<String>,
    },

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Authentication failure: missing or invalid token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authorization failure: insufficient permissions (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with existing resource (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    pub(crate) fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::EntityNotFound(_) => (StatusCode::NOT_FOUND, "ENTITY_NOT_FOUND"),
            Self::StaleState { .. } => (StatusCode::CONFLICT, "STALE_STATE"),
            Self::IllegalTransition { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "ILLEGAL_TRANSITION")
            }
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::StaleState {
                expected_from_state,
                actual_state,
                ..
            } => Some(json!({
                "expected_from_state": expected_from_state,
                "actual_state": actual_state,
            })),
            Self::IllegalTransition {
                current_state,
                legal_next_states,
                ..
            } => Some(json!({
                "current_state": current_state,
                "legal_next_states": legal_next_states,
            })),
            _ => None,
        }
    }

    /// Client-facing error detail. Internal messages are replaced.
    pub fn to_detail(&self) -> ErrorDetail {
        let (_, code) = self.status_and_code();
        let message = match self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };
        ErrorDetail {
            code: code.to_string(),
            message,
            details: self.details(),
        }
    }

    /// Log internal errors for operator visibility.
    pub(crate) fn log_if_internal(&self) {
        if matches!(self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, _) = self.status_and_code();
        self.log_if_internal();
        let body = ErrorBody {
            error: self.to_detail(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        let message = err.to_string();
        match err {
            TransitionError::Validation(inner) => Self::Validation(inner.to_string()),
            TransitionError::EntityNotFound { .. } => Self::EntityNotFound(message),
            TransitionError::StaleState {
                expected, actual, ..
            } => Self::StaleState {
                message,
                expected_from_state: expected.name().to_string(),
                actual_state: actual.name().to_string(),
            },
            TransitionError::IllegalTransition {
                current,
                legal_next_states,
                ..
            } => Self::IllegalTransition {
                message,
                current_state: current.name().to_string(),
                legal_next_states: legal_next_states
                    .iter()
                    .map(|s| s.name().to_string())
                    .collect(),
            },
            TransitionError::StoreFailure { .. } => Self::Internal(message),
        }
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Duplicate(_) => Self::Conflict(err.to_string()),
            RegistrationError::StateTypeMismatch { .. }
            | RegistrationError::EscrowLinkNotAllowed(_) => Self::Validation(err.to_string()),
        }
    }
}
