//! Token disbursement capability
//!
//! The faucet core treats disbursement as opaque: hand it an address and
//! an amount, get back a receipt or a failure. The dev implementation
//! fabricates deterministic-looking receipts without touching a chain.

use crate::error::FaucetResult;
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Transfers the dispensed token to a recipient address
#[async_trait]
pub trait Disburser: Send + Sync {
    /// Returns the transaction receipt/reference on success
    async fn disburse(&self, address: &str, amount: u128) -> FaucetResult<String>;
}

/// Dev disburser producing sha256-derived pseudo receipts
#[derive(Default)]
pub struct DevDisburser {
    counter: AtomicU64,
}

#[async_trait]
impl Disburser for DevDisburser {
    async fn disburse(&self, address: &str, amount: u128) -> FaucetResult<String> {
        let nonce = self.counter.fetch_add(1, Ordering::Relaxed);

        let mut hasher = Sha256::new();
        hasher.update(address.as_bytes());
        hasher.update(amount.to_be_bytes());
        hasher.update(Utc::now().timestamp_micros().to_be_bytes());
        hasher.update(nonce.to_be_bytes());

        Ok(format!("0x{}", hex::encode(hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dev_disburser_receipts_are_unique() {
        let disburser = DevDisburser::default();
        let addr = format!("0x{}", "ab".repeat(20));

        let a = disburser.disburse(&addr, 100).await.unwrap();
        let b = disburser.disburse(&addr, 100).await.unwrap();

        assert!(a.starts_with("0x"));
        assert_eq!(a.len(), 66);
        assert_ne!(a, b);
    }
}
