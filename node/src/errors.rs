// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Invalid report: {0}")]
    Validation(String),
    #[error("Ledger submission failed: {0}")]
    LedgerSubmission(String),
    #[error("Ledger wallet underfunded: {0}")]
    LedgerUnderfunded(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Admin operations are disabled")]
    AdminDisabled,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal server error")]
    Internal,
}

impl CollectorError {
    /// Ledger failures that the next scheduler cycle may resolve on its own.
    /// An underfunded wallet needs an operator.
    pub fn is_transient(&self) -> bool {
        matches!(self, CollectorError::LedgerSubmission(_))
    }
}

impl IntoResponse for CollectorError {
    fn into_response(self) -> Response {
        let retry = self.is_transient();
        let (status, message) = match self {
            CollectorError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            CollectorError::LedgerSubmission(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Ledger submission failed, will retry: {}", msg),
            ),
            CollectorError::LedgerUnderfunded(msg) => (
                StatusCode::PAYMENT_REQUIRED,
                format!("Ledger wallet needs funding: {}", msg),
            ),
            CollectorError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            CollectorError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            CollectorError::AdminDisabled => (
                StatusCode::FORBIDDEN,
                "Admin operations are disabled".to_string(),
            ),
            CollectorError::Config(msg) | CollectorError::Persistence(msg) => {
                tracing::error!("Request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            CollectorError::Io(e) => {
                tracing::error!("Request failed on IO: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            CollectorError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string()),
        };

        let body = Json(json!({
            "error": message,
            "retry": retry,
        }));

        (status, body).into_response()
    }
}
