//! Error types shared by the domain, storage and HTTP layers.
//!
//! Every error is terminal for the action that triggered it. Nothing here is
//! retried automatically and nothing is fatal to the process.

use axum::{Json, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Role/user/password combination was not accepted.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No session, or the bearer token is unknown.
    #[error("authentication required")]
    Unauthorized,

    /// The session exists but carries the wrong role.
    #[error("this action requires the {required} role")]
    Forbidden { required: &'static str },

    /// A required field is missing or malformed.
    #[error("{field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// A workflow move outside the adjacency set.
    #[error("cannot move from '{from}' to '{to}'")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The report/notification dispatcher failed. Nothing was recorded.
    #[error("report dispatch failed: {0}")]
    Dispatch(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidCredentials | Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Dispatch(_) => StatusCode::BAD_GATEWAY,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert into the rejection shape returned by every handler.
    pub fn reject(&self) -> (StatusCode, Json<ErrorResponse>) {
        let field = match self {
            Error::Validation { field, .. } => Some(*field),
            _ => None,
        };
        // Storage details stay in the logs.
        let error = match self {
            Error::Storage(_) => "internal storage error".to_string(),
            other => other.to_string(),
        };
        (self.status_code(), Json(ErrorResponse { error, field }))
    }
}

/// JSON error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}
