//! Error types for the authentication core and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use super::validation::ValidationErrors;

/// Errors surfaced by `AuthService` and the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("email already registered")]
    DuplicateEmail,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("unauthorized")]
    Unauthorized,

    #[error("hashing error: {0}")]
    Hashing(String),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Token lookup failures. Kept distinct inside the issuer, collapsed to
/// `AuthError::Unauthorized` at the service boundary.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token not found")]
    NotFound,

    #[error("token expired")]
    Expired,

    #[error("token revoked")]
    Revoked,

    #[error("token storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::NotFound | TokenError::Expired | TokenError::Revoked => {
                AuthError::Unauthorized
            }
            TokenError::Storage(e) => AuthError::Storage(e),
        }
    }
}

impl From<ValidationErrors> for AuthError {
    fn from(e: ValidationErrors) -> Self {
        AuthError::Validation(e)
    }
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::DuplicateEmail => StatusCode::CONFLICT,
            AuthError::InvalidCredentials | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Hashing(_) | AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::DuplicateEmail => "DUPLICATE_EMAIL",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::Unauthorized => "UNAUTHORIZED",
            AuthError::Hashing(_) | AuthError::Storage(_) => "INTERNAL_ERROR",
        }
    }
}

/// Error body returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let (message, errors) = match self {
            AuthError::Validation(errors) => ("The given data was invalid.".to_string(), Some(errors)),
            AuthError::DuplicateEmail => ("User already exists, please login".to_string(), None),
            AuthError::InvalidCredentials => ("Invalid credentials".to_string(), None),
            AuthError::Unauthorized => ("Unauthorized".to_string(), None),
            AuthError::Hashing(e) => {
                error!(error = %e, "password hashing failed");
                ("Internal server error".to_string(), None)
            }
            AuthError::Storage(e) => {
                error!(error = ?e, "storage operation failed");
                ("Internal server error".to_string(), None)
            }
        };

        let body = ErrorResponse {
            status: "error",
            code,
            message,
            errors,
        };
        (status, Json(body)).into_response()
    }
}
