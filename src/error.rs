//! Error types and Axum response conversions.
//!
//! Every error carries a stable `kind` string in its JSON body so client UIs
//! can branch (e.g., "expired, retry" vs "wrong account, switch wallet").

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application error types.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Challenge not found")]
    ChallengeNotFound,

    #[error("Challenge expired")]
    ChallengeExpired,

    #[error("Challenge already consumed")]
    ChallengeAlreadyConsumed,

    #[error("Signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("Recovered address does not match claimed address")]
    AddressMismatch,

    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Rate limited")]
    RateLimited { retry_after_secs: u64 },

    #[error("Account not found")]
    AccountNotFound,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable kind, part of the API contract.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::ChallengeNotFound => "challenge_not_found",
            AppError::ChallengeExpired => "challenge_expired",
            AppError::ChallengeAlreadyConsumed => "challenge_already_consumed",
            AppError::SignatureInvalid(_) => "signature_invalid",
            AppError::AddressMismatch => "address_mismatch",
            AppError::TokenInvalid(_) => "token_invalid",
            AppError::TokenExpired => "token_expired",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::AccountNotFound => "account_not_found",
            AppError::Storage(_) => "storage_unavailable",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, message) = match &self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ChallengeNotFound
            | AppError::ChallengeExpired
            | AppError::ChallengeAlreadyConsumed => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::SignatureInvalid(_) | AppError::AddressMismatch => {
                // Potential spoofing attempt, logged at higher severity
                tracing::warn!(kind, error = %self, "Signature verification failure");
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::TokenInvalid(_) | AppError::TokenExpired => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            AppError::RateLimited { retry_after_secs } => {
                let body = Json(json!({
                    "success": false,
                    "error": "Rate limit exceeded",
                    "kind": kind,
                    "retry_after_secs": retry_after_secs,
                }));
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, retry_after_secs.to_string())],
                    body,
                )
                    .into_response();
            }
            AppError::AccountNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Storage(msg) => {
                // Log detailed error server-side, return generic message to client
                tracing::error!(error = %msg, "Storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage unavailable".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Storage(format!("Redis error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}
