// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::{
    engine::{
        launch::LaunchError,
        registry::RegistryError,
        selection::SelectionError,
        session::SessionError,
    },
    models::scheduled_test::Unavailable,
    store::StoreError,
};

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden (e.g., test not open yet)
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., duplicate username)
    Conflict(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Storage failures are internal unless they describe a conflict the
/// caller can fix.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl From<SelectionError> for AppError {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::NoTopics | SelectionError::ZeroCount => {
                AppError::BadRequest(err.to_string())
            }
            SelectionError::NoQuestionsAvailable => AppError::NotFound(err.to_string()),
            SelectionError::Load { .. } => AppError::InternalServerError(format!("{:?}", err)),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotStarted | SessionError::AlreadyStarted | SessionError::Complete => {
                AppError::Conflict(err.to_string())
            }
            SessionError::Empty
            | SessionError::IndexOutOfRange(_)
            | SessionError::InvalidOption(_) => AppError::BadRequest(err.to_string()),
        }
    }
}

impl From<Unavailable> for AppError {
    fn from(err: Unavailable) -> Self {
        AppError::Forbidden(err.to_string())
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound | RegistryError::TestNotFound => {
                AppError::NotFound(err.to_string())
            }
            RegistryError::Unavailable(e) => e.into(),
            RegistryError::Store(e) => e.into(),
            RegistryError::Session(e) => e.into(),
        }
    }
}

impl From<LaunchError> for AppError {
    fn from(err: LaunchError) -> Self {
        match err {
            LaunchError::TestNotFound => AppError::NotFound(err.to_string()),
            LaunchError::Unavailable(e) => e.into(),
            LaunchError::Selection(e) => e.into(),
            LaunchError::Store(e) => e.into(),
            LaunchError::Session(SessionError::Empty) => {
                AppError::NotFound(SelectionError::NoQuestionsAvailable.to_string())
            }
            LaunchError::Session(e) => e.into(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
