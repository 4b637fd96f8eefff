//! Client error types

use reqwest::StatusCode;
use shared::error::{ApiResponse, AppError, ErrorCategory, ErrorCode};
use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Authentication required
    #[error("Authentication required")]
    Unauthorized,

    /// Permission denied
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(AppError),

    /// Request rejected as invalid
    #[error("Validation error: {0}")]
    Validation(AppError),

    /// Request rejected because server state moved on
    #[error("Conflict: {0}")]
    Conflict(AppError),

    /// Server-side failure
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Classify a non-success HTTP response.
    ///
    /// The error code inside the envelope wins over the HTTP status when the
    /// body carries one; otherwise the status decides.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let envelope = serde_json::from_str::<ApiResponse<serde_json::Value>>(body).ok();

        if status.is_server_error() {
            let message = envelope
                .map(|e| e.message)
                .unwrap_or_else(|| body.to_string());
            return Self::Server {
                status: status.as_u16(),
                message,
            };
        }

        if let Some(envelope) = envelope {
            let err = envelope.to_app_error();
            if err.code != ErrorCode::Unknown {
                return Self::from_app_error(err);
            }
        }

        let text = if body.is_empty() {
            status.canonical_reason().unwrap_or("").to_string()
        } else {
            body.to_string()
        };
        match status {
            StatusCode::BAD_REQUEST => Self::Validation(AppError::validation(text)),
            StatusCode::UNAUTHORIZED => Self::Unauthorized,
            StatusCode::FORBIDDEN => Self::Forbidden(text),
            StatusCode::NOT_FOUND => Self::NotFound(AppError::with_message(ErrorCode::NotFound, text)),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                Self::Conflict(AppError::conflict(text))
            }
            _ => Self::Server {
                status: status.as_u16(),
                message: text,
            },
        }
    }

    /// Classify an error reported by the order service envelope
    pub fn from_app_error(err: AppError) -> Self {
        match err.code {
            ErrorCode::NotFound
            | ErrorCode::StagedOrderNotFound
            | ErrorCode::OrderNotFound
            | ErrorCode::LineItemNotFound
            | ErrorCode::PromotionNotFound => Self::NotFound(err),
            ErrorCode::NotAuthenticated | ErrorCode::TokenExpired => Self::Unauthorized,
            ErrorCode::PermissionDenied => Self::Forbidden(err.message),
            code if code.is_conflict() => Self::Conflict(err),
            code if code.category() == ErrorCategory::System => Self::Server {
                status: 500,
                message: err.message,
            },
            _ => Self::Validation(err),
        }
    }

    /// Error code reported by the server, if any
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::NotFound(e) | Self::Validation(e) | Self::Conflict(e) => Some(e.code),
            _ => None,
        }
    }

    /// Failure without a business reason (network, timeout, 5xx)
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_decode(),
            Self::Server { .. } => true,
            _ => false,
        }
    }

    /// Server rejected the request because of state drift
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Resource is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
