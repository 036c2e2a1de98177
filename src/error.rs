use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::ApiResponse;

/// AppError
///
/// Every failure a handler can produce. Each variant maps to one HTTP status and a
/// human-readable message telling the caller what to do next; raw collaborator errors
/// never reach the response body.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// No session token was presented, or it resolves to an account that no longer exists.
    #[error("Not authorized to access this route, please try logging in first.")]
    Unauthenticated,

    /// A token was presented but is malformed, tampered with, or past its expiry.
    #[error("This session has expired. Please log in again.")]
    SessionExpired,

    #[error("Invalid email or password. Please try again with the correct credentials.")]
    InvalidCredentials,

    /// Authenticated, but neither the owner of the resource nor an admin.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// The image store rejected or failed the upload. The cause is logged, never rendered.
    #[error("We could not upload your image. Please try again.")]
    AssetUpload,

    #[error("It seems you already have an account, please log in instead.")]
    DuplicateAccount,

    /// Unexpected collaborator outage. The detail is logged, never rendered.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::AssetUpload | AppError::DuplicateAccount => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthenticated | AppError::SessionExpired | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to the client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => {
                "Something went wrong on our side. Please try again later.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let AppError::Internal(detail) = &self {
            tracing::error!(%detail, "request failed with an internal error");
        }

        let body: ApiResponse<()> = ApiResponse::failure(status, self.public_message());
        (status, Json(body)).into_response()
    }
}

/// RepositoryError
///
/// Failures reported by a Record Store implementation.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A unique constraint (account email) was violated.
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("record store failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                RepositoryError::Conflict(db_err.message().to_string())
            }
            _ => RepositoryError::Backend(err.to_string()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(_) => AppError::DuplicateAccount,
            RepositoryError::Backend(detail) => AppError::Internal(detail),
        }
    }
}

/// StorageError
///
/// Failures reported by an Asset Store implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not read local file {path}: {reason}")]
    LocalFile { path: String, reason: String },

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("delete failed: {0}")]
    Delete(String),
}

/// CacheError
///
/// Failures reported by a Read Cache implementation.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}
