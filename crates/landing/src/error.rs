//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error renders as JSON `{message, mc?, retryable?}` with a short,
//! non-technical message. Remote detail is logged, never returned.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use sweetbox_core::{SignupError, TicketCodeError, ValidationError};
use thiserror::Error;

use crate::services::UpsertError;

/// Application-level error type for the landing service.
#[derive(Debug, Error)]
pub enum AppError {
    /// Input rejected before any remote call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Mailing list upsert failed (or is not configured).
    #[error("Upsert error: {0}")]
    Upsert(#[from] UpsertError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// A submission for this visitor is still running.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Request body rejected");
        Self::BadRequest("Invalid request body".to_string())
    }
}

impl From<TicketCodeError> for AppError {
    fn from(_: TicketCodeError) -> Self {
        Self::Validation("A valid 8-character ticket code is required".to_string())
    }
}

impl From<SignupError<UpsertError>> for AppError {
    fn from(err: SignupError<UpsertError>) -> Self {
        match err {
            SignupError::Validation(e) => e.into(),
            SignupError::ConsentRequired => {
                Self::Validation("Please accept the privacy policy to continue".to_string())
            }
            SignupError::AlreadyComplete => Self::Conflict("Signup is already complete".to_string()),
            SignupError::NotSkippable(step) => {
                Self::BadRequest(format!("The {step} step cannot be skipped"))
            }
            SignupError::CannotGoBack(step) => {
                Self::BadRequest(format!("Cannot go back from the {step} step"))
            }
            SignupError::Capture(e) => Self::Upsert(e),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upsert(UpsertError::NotConfigured) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Upsert(UpsertError::Rejected(_)) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Upsert(UpsertError::NotConfigured) | Self::Session(_) | Self::Internal(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else if let Self::Upsert(err) = &self {
            tracing::warn!(error = %err, "Mailing list rejected signup");
        }

        let status = self.status();

        // Don't expose internal error details to clients
        let body = match &self {
            Self::Upsert(UpsertError::NotConfigured) => {
                json!({ "message": "Server configuration error" })
            }
            Self::Session(_) | Self::Internal(_) => json!({ "message": "Internal server error" }),
            Self::Upsert(UpsertError::Rejected(remote)) => {
                let retryable = remote.kind.is_retryable();
                let message = if retryable {
                    "The signup service is not responding. Please try again."
                } else {
                    "Signup failed. Please check your details and try again."
                };
                json!({ "message": message, "mc": remote.kind, "retryable": retryable })
            }
            Self::Validation(msg) | Self::Conflict(msg) | Self::BadRequest(msg) => {
                json!({ "message": msg })
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
