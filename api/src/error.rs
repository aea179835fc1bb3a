use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::ErrorBody;

use crate::users::StoreError;

/// Every failure a handler can answer with.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    Conflict(String),
    /// Carries the detail for the server log; the client only sees the
    /// generic message.
    Internal {
        message: &'static str,
        source: anyhow::Error,
    },
}
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn internal(message: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            message,
            source: source.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) | Self::NotFound(msg) | Self::Conflict(msg) => f.write_str(msg),
            Self::Internal { message, source } => write!(f, "{message}: {source:#}"),
        }
    }
}

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = match self {
            Self::Validation(msg) | Self::NotFound(msg) | Self::Conflict(msg) => msg,
            Self::Internal { message, source } => {
                tracing::error!("{message}: {source:?}");
                message.to_string()
            }
        };

        (status, Json(ErrorBody { error })).into_response()
    }
}

/// Maps a store failure onto a response, using `message` for anything that
/// is not a known conflict.
pub fn store_error(message: &'static str) -> impl FnOnce(StoreError) -> AppError {
    move |err| match err {
        StoreError::DuplicateEmail => AppError::Conflict("Email already exists".to_string()),
        StoreError::Backend(source) => AppError::internal(message, source),
    }
}
