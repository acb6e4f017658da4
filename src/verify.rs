//! Verification capabilities consumed by the tier controller
//!
//! Each capability is a single trait with swappable implementations. The
//! dev implementations accept a fixed reference scheme so the service
//! can run against nothing but itself; production deployments plug in
//! on-chain verification behind the same traits without touching any
//! caller.

use crate::error::{FaucetError, FaucetResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Result of a payment verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCheck {
    pub verified: bool,
    /// Amount observed on the payment, in wei
    pub amount: u128,
    /// Payer address, when the verifier can attribute the payment
    pub payer: Option<String>,
    /// Reason the payment was not accepted
    pub error: Option<String>,
}

impl PaymentCheck {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            amount: 0,
            payer: None,
            error: Some(reason.into()),
        }
    }
}

/// Agent identity verification
#[async_trait]
pub trait AgentVerifier: Send + Sync {
    async fn verify_agent(&self, agent_name: &str) -> FaucetResult<bool>;
}

/// Payment claim verification against an expected amount
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify_payment(
        &self,
        tx_reference: &str,
        expected_amount: u128,
    ) -> FaucetResult<PaymentCheck>;
}

/// Deposit reference authenticity check, applied before crediting
pub trait DepositPolicy: Send + Sync {
    /// `Err` carries the rejection reason shown to the agent
    fn check(&self, tx_reference: &str) -> Result<(), String>;
}

/// Dev identity verifier: any non-empty agent name is acceptable
pub struct DevAgentVerifier;

#[async_trait]
impl AgentVerifier for DevAgentVerifier {
    async fn verify_agent(&self, agent_name: &str) -> FaucetResult<bool> {
        Ok(!agent_name.trim().is_empty())
    }
}

/// Dev payment verifier accepting the `0xPAID` reference scheme
pub struct DevPaymentVerifier;

#[async_trait]
impl PaymentVerifier for DevPaymentVerifier {
    async fn verify_payment(
        &self,
        tx_reference: &str,
        expected_amount: u128,
    ) -> FaucetResult<PaymentCheck> {
        if tx_reference.starts_with("0xPAID") {
            debug!("Dev payment accepted: tx={}", tx_reference);
            Ok(PaymentCheck {
                verified: true,
                amount: expected_amount,
                payer: Some(format!("0x{}", "1".repeat(40))),
                error: None,
            })
        } else {
            Ok(PaymentCheck::rejected(
                "Payment not recognized. Use a tx starting with 0xPAID in dev mode.",
            ))
        }
    }
}

/// Deposit policy accepting references with one of the given prefixes
pub struct PrefixDepositPolicy {
    prefixes: Vec<String>,
}

impl PrefixDepositPolicy {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }
}

impl Default for PrefixDepositPolicy {
    fn default() -> Self {
        Self::new(vec!["0xDEPOSIT".to_string(), "0xPAID".to_string()])
    }
}

impl DepositPolicy for PrefixDepositPolicy {
    fn check(&self, tx_reference: &str) -> Result<(), String> {
        if self.prefixes.iter().any(|p| tx_reference.starts_with(p)) {
            Ok(())
        } else {
            Err("Invalid deposit transaction. Use a tx starting with 0xDEPOSIT in dev mode."
                .to_string())
        }
    }
}

/// Agent name shape check.
///
/// Agent names key the ledger trees with a NUL separator, so NUL (and
/// other control characters) must never reach the store.
pub fn validate_agent_name(agent_name: &str) -> FaucetResult<()> {
    if agent_name.trim().is_empty() {
        return Err(FaucetError::InvalidAgentName(
            "agent name required".to_string(),
        ));
    }
    if agent_name.chars().any(|c| c.is_control()) {
        return Err(FaucetError::InvalidAgentName(
            "agent name must not contain control characters".to_string(),
        ));
    }
    if agent_name.len() > 128 {
        return Err(FaucetError::InvalidAgentName(
            "agent name too long (max 128 bytes)".to_string(),
        ));
    }
    Ok(())
}

/// Basic recipient address shape check (0x-prefixed, 20 bytes of hex)
pub fn validate_address(address: &str) -> FaucetResult<()> {
    let hex_part = address
        .strip_prefix("0x")
        .ok_or_else(|| FaucetError::InvalidAddress("missing 0x prefix".to_string()))?;

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FaucetError::InvalidAddress(
            "expected 20 hex-encoded bytes".to_string(),
        ));
    }

    Ok(())
}
