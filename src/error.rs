use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ledger::models::TxId;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Quote error: {0}")]
    Quote(#[from] QuoteError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Quote-related errors, returned synchronously to the caller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Quote figures are inconsistent: {0}")]
    Inconsistent(String),
}

/// Settlement scheduler errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Quote does not match transfer: {0}")]
    QuoteMismatch(String),

    #[error("Transfer {0} is not pending")]
    NotPending(TxId),

    #[error("Scheduler is shutting down")]
    ShuttingDown,
}

/// Upstream price source failures.
///
/// These never escape the price feed cache; they only decide whether a
/// cooldown starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceFeedError {
    #[error("Price source returned HTTP {0}")]
    Http(u16),

    #[error("Price source transport error: {0}")]
    Transport(String),

    #[error("Unexpected price source response: {0}")]
    Malformed(String),

    #[error("Price source timed out after {0}ms")]
    Timeout(u64),
}

/// Metrics sink write failure (logged, never propagated)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("Metrics write failed: {0}")]
    WriteFailed(String),
}

/// Event delivery failure (logged, never propagated)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    #[error("Event delivery failed: {0}")]
    Delivery(String),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::Quote(QuoteError::InvalidAmount(reason)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_AMOUNT",
                format!("Invalid amount: {}", reason),
                None,
            ),
            AppError::Quote(QuoteError::Inconsistent(reason)) => (
                StatusCode::BAD_REQUEST,
                "QUOTE_MISMATCH",
                format!("Quote figures are inconsistent: {}", reason),
                None,
            ),
            AppError::Settlement(SettlementError::InvalidAmount(reason)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_AMOUNT",
                format!("Invalid amount: {}", reason),
                None,
            ),
            AppError::Settlement(SettlementError::QuoteMismatch(reason)) => (
                StatusCode::BAD_REQUEST,
                "QUOTE_MISMATCH",
                format!("Quote does not match transfer: {}", reason),
                None,
            ),
            AppError::Settlement(SettlementError::NotPending(tx_id)) => (
                StatusCode::NOT_FOUND,
                "NOT_PENDING",
                format!("Transfer {} is not pending", tx_id),
                Some(serde_json::json!({ "tx_id": tx_id })),
            ),
            AppError::Settlement(SettlementError::ShuttingDown) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SHUTTING_DOWN",
                "Settlement scheduler is shutting down".to_string(),
                None,
            ),
            AppError::InvalidInput(message) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", message, None)
            }
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Rate limit exceeded. Please try again later.".to_string(),
                None,
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
