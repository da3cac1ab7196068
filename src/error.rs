#[cfg(feature = "api")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Main error type for the application
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The supplied bytes could not be decoded as an image
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The image decoded but has no pixels to sample
    #[error("Image has zero width or height")]
    EmptyImage,

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The embedding model failed to initialize for this process
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// The embedding model is still loading
    #[error("Model still loading, wait a second and try again")]
    ModelNotReady,

    /// Two embeddings of different length were compared or stored together
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension already established by the reference set or left operand.
        expected: usize,
        /// Dimension of the offending embedding.
        actual: usize,
    },

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Every session slot is taken
    #[error("Session limit of {0} reached")]
    SessionLimit(usize),

    /// Upload errors
    #[error("Upload error: {0}")]
    UploadError(String),

    /// Internal server errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Standard error response format
#[derive(Serialize)]
#[derive(Debug)]
pub struct ErrorResponse {
    /// Error code (HTTP status code)
    pub code: u16,
    /// Error message
    pub message: String,
    /// Optional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    #[cfg(feature = "api")]
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::UploadError(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Image(_) | Self::EmptyImage | Self::DimensionMismatch { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::ModelNotReady | Self::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::SessionLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert the error to a JSON response
    pub fn to_json(&self) -> ErrorResponse {
        #[cfg(feature = "api")]
        let code = self.status_code().as_u16();
        #[cfg(not(feature = "api"))]
        let code = 500u16;

        let details = match self {
            Self::ModelNotReady => Some("Retry once the model status is ready".to_string()),
            Self::ModelUnavailable(_) => {
                Some("The model could not be loaded; restart the service to try again".to_string())
            }
            Self::SessionLimit(_) => {
                Some("Close an unused session or retry once idle sessions expire".to_string())
            }
            _ => None,
        };

        ErrorResponse {
            code,
            message: self.to_string(),
            details,
        }
    }
}

#[cfg(feature = "api")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let response = self.to_json();

        (status, Json(response)).into_response()
    }
}

#[cfg(feature = "api")]
impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        AppError::UploadError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Task join error: {}", err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Extension trait for working with Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    /// Add context to an error if the result is an error
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| AppError::Internal(format!("{}: {}", context, e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| {
            let context = f();
            AppError::Internal(format!("{}: {}", context, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_errors_carry_retry_details() {
        let response = AppError::ModelNotReady.to_json();
        assert!(response.details.is_some());
        assert!(response.message.contains("still loading"));

        let response = AppError::InvalidInput("bad".to_string()).to_json();
        assert!(response.details.is_none());
    }

    #[cfg(feature = "api")]
    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::ModelNotReady.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(AppError::EmptyImage.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            AppError::NotFound("session".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::DimensionMismatch { expected: 3, actual: 4 }.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AppError::SessionLimit(8).status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_context_wraps_as_internal() {
        let err: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        match err.context("loading weights") {
            Err(AppError::Internal(msg)) => assert_eq!(msg, "loading weights: boom"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
