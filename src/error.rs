//! Common error types for the image generation service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request body was malformed or violated a field constraint
    #[error("{0}")]
    Validation(String),

    /// The inference capability could not be initialized
    #[error("failed to load model: {0}")]
    Load(String),

    /// The inference capability rejected or failed a generation call
    #[error("{0}")]
    Inference(String),

    #[error("failed to encode image: {0}")]
    Encoding(String),

    #[error("Generation queue is full: {0}")]
    QueueFull(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded. Please slow down your requests.")]
    RateLimitExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status code this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::Load(_)
            | AppError::Inference(_)
            | AppError::Encoding(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error came out of loading or running the pipeline
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            AppError::Load(_) | AppError::Inference(_) | AppError::Encoding(_)
        )
    }

    /// Human readable message placed in the response body
    pub fn detail(&self) -> String {
        if self.is_generation_failure() {
            format!("Image generation failed: {}", self)
        } else {
            self.to_string()
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = Json(ErrorResponse {
            detail: self.detail(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
