use crate::services::object_store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

/// Body of every 404 response. Expired and unknown ids are indistinguishable.
pub const NOT_FOUND_MESSAGE: &str = "File not found";

/// Body of every 500 response. Details stay in the server log.
pub const INTERNAL_MESSAGE: &str = "Server Error";

/// An HTTP error rendered as a plain-text body.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Generic 500; the caller is expected to have logged the cause.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnsupportedType { .. } | StoreError::TooLarge { .. } => {
                AppError::bad_request(err.to_string())
            }
            StoreError::NotFound(_) => AppError::not_found(),
            StoreError::Io(io_err) => {
                tracing::error!("storage I/O failure: {}", io_err);
                AppError::internal()
            }
        }
    }
}
