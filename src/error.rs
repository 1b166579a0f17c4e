use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::migrate::MigrateError;
use std::time::Duration;
use thiserror::Error;

use crate::ledger::models::OrderStatus;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrateError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Accrual service rate limit active for another {0:?}")]
    RateLimited(Duration),
}

/// Violations of the order lifecycle rules
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Accrual {amount} cannot be recorded with status {status}")]
    AccrualWithoutProcessed { status: OrderStatus, amount: Decimal },

    #[error("Status PROCESSED requires an accrual amount")]
    MissingAccrual,

    #[error("Accrual must not be negative: {0}")]
    NegativeAccrual(Decimal),
}

/// Reasons an accrual query could not produce a usable answer
#[derive(Error, Debug)]
pub enum AccrualError {
    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected status code: {0}")]
    UnexpectedStatus(u16),

    #[error("Malformed response body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("Response is for order {actual}, expected {expected}")]
    OrderMismatch { expected: String, actual: String },

    #[error("Inconsistent accrual for status {0}")]
    InconsistentAccrual(String),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::Order(OrderError::NotFound(what)) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
            ),
            AppError::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                msg.clone(),
            ),
            AppError::RateLimited(remaining) => (
                StatusCode::CONFLICT,
                "RATE_LIMITED",
                format!(
                    "Accrual service rate limit active, retry in {} ms",
                    u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX)
                ),
            ),
            AppError::Order(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "ORDER_RULE_VIOLATION",
                err.to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
