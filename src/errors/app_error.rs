//! Errors returned by the HTTP API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::core::tools::RenderError;
use crate::state::ConnectionLimitError;

#[derive(Debug, Error)]
pub enum AppError {
    /// The request was understood but its content is unusable
    #[error("{0}")]
    BadRequest(String),

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    /// No live-session slot left for the caller
    #[error(transparent)]
    ConnectionLimit(#[from] ConnectionLimitError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            // Unusable input detected by the renderer is still the caller's fault
            AppError::Render(RenderError::Empty | RenderError::InvalidInput(_)) => {
                StatusCode::BAD_REQUEST
            }
            AppError::ConnectionLimit(ConnectionLimitError::GlobalLimitReached) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::ConnectionLimit(ConnectionLimitError::PerIpLimitReached) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Render(RenderError::Encode(_)) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
