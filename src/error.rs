use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Pledge error: {0}")]
    Pledge(#[from] PledgeError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Pledge lifecycle errors
#[derive(Error, Debug)]
pub enum PledgeError {
    #[error("Pledge not found: {0}")]
    NotFound(Uuid),

    #[error("Pledge in invalid state: {current}, expected: {expected}")]
    InvalidState { current: String, expected: String },

    #[error("Pledge amount must be positive")]
    InvalidAmount,

    #[error("Fund not found: {0}")]
    FundNotFound(Uuid),

    #[error("Fund is not active: {0}")]
    FundInactive(Uuid),

    #[error("Pledge was modified concurrently")]
    ConcurrentUpdate,
}

/// Charge gateway adapter errors
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Gateway request timed out")]
    Timeout,

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed gateway response: {0}")]
    MalformedResponse(String),
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
            AppError::Pledge(PledgeError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "PLEDGE_NOT_FOUND",
                format!("Pledge not found: {}", id),
                None,
            ),
            AppError::Pledge(PledgeError::InvalidState { current, expected }) => (
                StatusCode::CONFLICT,
                "PLEDGE_INVALID_STATE",
                format!("Pledge in state {}, expected {}", current, expected),
                Some(serde_json::json!({
                    "current": current,
                    "expected": expected,
                })),
            ),
            AppError::Pledge(PledgeError::InvalidAmount) => (
                StatusCode::BAD_REQUEST,
                "INVALID_AMOUNT",
                "Pledge amount must be positive".to_string(),
                None,
            ),
            AppError::Pledge(PledgeError::FundNotFound(id)) => (
                StatusCode::BAD_REQUEST,
                "FUND_NOT_FOUND",
                format!("Fund not found: {}", id),
                None,
            ),
            AppError::Pledge(PledgeError::FundInactive(id)) => (
                StatusCode::BAD_REQUEST,
                "FUND_INACTIVE",
                format!("Fund is not active: {}", id),
                Some(serde_json::json!({ "fund_id": id })),
            ),
            AppError::Pledge(PledgeError::ConcurrentUpdate) => (
                StatusCode::CONFLICT,
                "CONCURRENT_UPDATE",
                "Pledge was modified concurrently, retry the request".to_string(),
                None,
            ),
            AppError::Gateway(GatewayError::Timeout) => (
                StatusCode::GATEWAY_TIMEOUT,
                "GATEWAY_TIMEOUT",
                "Charge gateway request timed out".to_string(),
                None,
            ),
            AppError::Gateway(err) => (
                StatusCode::BAD_GATEWAY,
                "GATEWAY_ERROR",
                err.to_string(),
                None,
            ),
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, "NOT_FOUND", what, None),
            AppError::InvalidInput(msg) | AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None)
            }
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
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

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            AppError::Gateway(GatewayError::Timeout)
        } else {
            AppError::Gateway(GatewayError::Unavailable(format!("{:?}", error)))
        }
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
