//! Server error types and their HTTP rendering.

use std::net::SocketAddr;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tollgate::{ErrorKind, SignupError};

use crate::auth::AuthError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving requests.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Authentication failed.
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    /// Authenticated, but not an operator.
    #[error("forbidden: the {role} role is required")]
    MissingRole { role: &'static str },

    #[error(transparent)]
    Signup(#[from] SignupError),

    /// The request body could not be parsed.
    #[error("{0}")]
    BadRequest(String),

    #[error("invalid bind address {0}")]
    InvalidBindAddress(String),

    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Body of every non-authentication error response.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: u16,
    status: &'a str,
    message: String,
    details: &'a str,
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServerError::MissingRole { .. } => StatusCode::FORBIDDEN,
            ServerError::Signup(err) => match err.kind() {
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
                ErrorKind::TransientConflict | ErrorKind::Internal => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::InvalidBindAddress(_)
            | ServerError::BindFailed { .. }
            | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> &str {
        match self {
            ServerError::MissingRole { .. } => "insufficient permissions",
            ServerError::Signup(err) => err.details(),
            ServerError::BadRequest(_) => "invalid request body",
            _ => "internal error",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let ServerError::Unauthorized(err) = &self {
            tracing::debug!(%err, "request not authenticated");
            return (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response();
        }

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            code: status.as_u16(),
            status: status.canonical_reason().unwrap_or("Unknown"),
            message: self.to_string(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}
