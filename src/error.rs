//! Error types for the faucet service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Faucet service errors
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("Free tier cooldown active: retry in {retry_after_secs} seconds")]
    CooldownActive { retry_after_secs: u64 },

    #[error("Rate limit exceeded: try again in {0} seconds")]
    RateLimitExceeded(u64),

    #[error("Agent verification failed: {0}")]
    VerificationFailed(String),

    #[error("Payment verification timed out")]
    VerificationTimeout,

    #[error("Payment not verified: {0}")]
    PaymentNotVerified(String),

    #[error("Insufficient balance: need {required} wei, short {shortfall} wei")]
    InsufficientBalance { required: u128, shortfall: u128 },

    #[error("Invalid deposit: {0}")]
    InvalidDeposit(String),

    #[error("Duplicate deposit reference: {0}")]
    DuplicateDepositReference(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid agent name: {0}")]
    InvalidAgentName(String),

    #[error("Disbursement failed: {0}")]
    DisbursementFailed(String),

    #[error("Storage unavailable: {0}")]
    Storage(#[from] sled::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl FaucetError {
    /// Machine-checkable reason code, stable across message changes.
    pub fn code(&self) -> &'static str {
        match self {
            FaucetError::CooldownActive { .. } => "COOLDOWN_ACTIVE",
            FaucetError::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
            FaucetError::VerificationFailed(_) => "VERIFICATION_FAILED",
            FaucetError::VerificationTimeout => "VERIFICATION_TIMEOUT",
            FaucetError::PaymentNotVerified(_) => "PAYMENT_NOT_VERIFIED",
            FaucetError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            FaucetError::InvalidDeposit(_) => "INVALID_DEPOSIT",
            FaucetError::DuplicateDepositReference(_) => "DUPLICATE_DEPOSIT_REFERENCE",
            FaucetError::InvalidAddress(_) => "INVALID_ADDRESS",
            FaucetError::InvalidAmount(_) => "INVALID_AMOUNT",
            FaucetError::InvalidAgentName(_) => "INVALID_AGENT_NAME",
            FaucetError::DisbursementFailed(_) => "DISBURSEMENT_FAILED",
            FaucetError::Storage(_) => "STORAGE_UNAVAILABLE",
            FaucetError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Data the caller needs to self-correct, when there is any.
    fn details(&self) -> serde_json::Value {
        match self {
            FaucetError::CooldownActive { retry_after_secs } => {
                json!({ "retry_after_secs": retry_after_secs })
            }
            FaucetError::RateLimitExceeded(secs) => json!({ "retry_after_secs": secs }),
            FaucetError::InsufficientBalance { required, shortfall } => json!({
                "required": required.to_string(),
                "shortfall": shortfall.to_string(),
            }),
            _ => serde_json::Value::Null,
        }
    }
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        let status = match self {
            FaucetError::CooldownActive { .. } | FaucetError::RateLimitExceeded(_) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            FaucetError::VerificationFailed(_) => StatusCode::FORBIDDEN,
            FaucetError::VerificationTimeout => StatusCode::GATEWAY_TIMEOUT,
            FaucetError::PaymentNotVerified(_) | FaucetError::InsufficientBalance { .. } => {
                StatusCode::PAYMENT_REQUIRED
            }
            FaucetError::InvalidDeposit(_)
            | FaucetError::InvalidAddress(_)
            | FaucetError::InvalidAmount(_)
            | FaucetError::InvalidAgentName(_) => StatusCode::BAD_REQUEST,
            FaucetError::DuplicateDepositReference(_) => StatusCode::CONFLICT,
            FaucetError::DisbursementFailed(_) => StatusCode::BAD_GATEWAY,
            FaucetError::Storage(_) | FaucetError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
            "details": self.details(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;
