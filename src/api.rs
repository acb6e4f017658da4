//! HTTP API for the faucet service
//!
//! Thin JSON handlers over [`FaucetService`]; all tier policy lives in
//! the service, all user-facing error shapes in [`crate::error`].

use crate::error::{FaucetError, FaucetResult};
use crate::ledger::AccountSnapshot;
use crate::service::{FaucetService, FaucetStatus, GrantOutcome};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Free-tier request
#[derive(Debug, Deserialize)]
pub struct FreeRequest {
    pub agent_name: String,
    pub address: String,
}

/// Pay-per-request tier request
#[derive(Debug, Deserialize)]
pub struct PremiumRequest {
    pub agent_name: String,
    pub address: String,
    pub payment_tx: String,
}

/// Balance-funded tier request
#[derive(Debug, Deserialize)]
pub struct BalanceRequest {
    pub agent_name: String,
    pub address: String,
}

/// Pre-funding deposit request; `amount` is a decimal wei string
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub agent_name: String,
    pub amount: String,
    pub deposit_tx: String,
}

/// Success response envelope
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub data: T,
    pub timestamp: String,
}

impl<T> SuccessResponse<T> {
    fn new(data: T) -> Self {
        Self {
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// One tier's advertised terms
#[derive(Debug, Serialize)]
pub struct TierPricing {
    pub amount: String,
    pub price: String,
    pub cooldown_secs: u64,
}

/// Pricing sheet for both tiers
#[derive(Debug, Serialize)]
pub struct PricingResponse {
    pub free: TierPricing,
    pub premium: TierPricing,
    pub payment_address: String,
}

fn parse_amount(value: &str) -> FaucetResult<u128> {
    value.trim().parse::<u128>().map_err(|_| {
        FaucetError::InvalidAmount(format!("expected a decimal wei string, got {:?}", value))
    })
}

/// Free tier handler
pub async fn request_free_handler(
    State(service): State<Arc<FaucetService>>,
    Json(request): Json<FreeRequest>,
) -> FaucetResult<Json<SuccessResponse<GrantOutcome>>> {
    info!(
        "Free tier request: agent={} address={}",
        request.agent_name, request.address
    );

    let outcome = service
        .request_free(&request.agent_name, &request.address)
        .await?;
    Ok(Json(SuccessResponse::new(outcome)))
}

/// Pay-per-request tier handler
pub async fn request_premium_handler(
    State(service): State<Arc<FaucetService>>,
    Json(request): Json<PremiumRequest>,
) -> FaucetResult<Json<SuccessResponse<GrantOutcome>>> {
    info!(
        "Premium tier request: agent={} address={} payment_tx={}",
        request.agent_name, request.address, request.payment_tx
    );

    let outcome = service
        .request_premium(&request.agent_name, &request.address, &request.payment_tx)
        .await?;
    Ok(Json(SuccessResponse::new(outcome)))
}

/// Balance-funded tier handler
pub async fn request_balance_handler(
    State(service): State<Arc<FaucetService>>,
    Json(request): Json<BalanceRequest>,
) -> FaucetResult<Json<SuccessResponse<GrantOutcome>>> {
    info!(
        "Balance-funded request: agent={} address={}",
        request.agent_name, request.address
    );

    let outcome = service
        .request_balance(&request.agent_name, &request.address)
        .await?;
    Ok(Json(SuccessResponse::new(outcome)))
}

/// Deposit handler
pub async fn deposit_handler(
    State(service): State<Arc<FaucetService>>,
    Json(request): Json<DepositRequest>,
) -> FaucetResult<Json<SuccessResponse<AccountSnapshot>>> {
    info!(
        "Deposit request: agent={} amount={} tx={}",
        request.agent_name, request.amount, request.deposit_tx
    );

    let amount = parse_amount(&request.amount)?;
    let snapshot = service
        .deposit(&request.agent_name, amount, &request.deposit_tx)
        .await?;
    Ok(Json(SuccessResponse::new(snapshot)))
}

/// Balance query handler
pub async fn balance_handler(
    State(service): State<Arc<FaucetService>>,
    Path(agent_name): Path<String>,
) -> FaucetResult<Json<SuccessResponse<AccountSnapshot>>> {
    let snapshot = service.balance_info(&agent_name)?;
    Ok(Json(SuccessResponse::new(snapshot)))
}

/// Pricing handler
pub async fn pricing_handler(
    State(service): State<Arc<FaucetService>>,
) -> Json<SuccessResponse<PricingResponse>> {
    let config = service.config();

    Json(SuccessResponse::new(PricingResponse {
        free: TierPricing {
            amount: config.free_amount.clone(),
            price: "0".to_string(),
            cooldown_secs: config.cooldown_secs,
        },
        premium: TierPricing {
            amount: config.premium_amount.clone(),
            price: config.premium_price.clone(),
            cooldown_secs: 0,
        },
        payment_address: config.payment_address.clone(),
    }))
}

/// Status handler
pub async fn status_handler(
    State(service): State<Arc<FaucetService>>,
) -> FaucetResult<Json<SuccessResponse<FaucetStatus>>> {
    let status = service.status()?;
    Ok(Json(SuccessResponse::new(status)))
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Root handler with service info
pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Agent Faucet",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Tiered testnet token faucet with per-agent balance accounting",
        "endpoints": {
            "POST /api/request": "Free tier (cooldown-limited)",
            "POST /api/request-premium": "Premium tier (pay per request)",
            "POST /api/request-balance": "Premium tier (balance-funded)",
            "POST /api/deposit": "Pre-fund an agent balance",
            "GET /api/balance/:agent_name": "Account snapshot",
            "GET /api/pricing": "Tier pricing",
            "GET /api/status": "Faucet status",
            "GET /health": "Health check"
        }
    }))
}
