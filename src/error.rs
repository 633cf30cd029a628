//! Error taxonomy for the HTTP surface.
//!
//! Every error leaves the API as a status code plus `{"message": ...}`.
//! Authentication errors carry short fixed messages; internal failures are
//! logged and reported as a generic "Server error".

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::export::ExportError;
use crate::models::ValidationError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown username or wrong password. Deliberately one variant.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized: No token")]
    Unauthenticated,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Forbidden: Admins only")]
    Forbidden,

    #[error("password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("token signing failed: {0}")]
    Signing(jsonwebtoken::errors::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::Unauthenticated
            | AuthError::TokenExpired
            | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Hashing(_)
            | AuthError::Signing(_)
            | AuthError::Storage(_)
            | AuthError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Body that is not JSON, is mistyped, or carries unknown fields.
    #[error("{}", .0.body_text())]
    BadJson(#[from] JsonRejection),

    #[error("{0}")]
    NotFound(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(e) => e.status(),
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::BadJson(rejection) => match rejection.status() {
                StatusCode::UNSUPPORTED_MEDIA_TYPE => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                _ => StatusCode::BAD_REQUEST,
            },
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) | ApiError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
