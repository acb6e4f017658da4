//! Faucet configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Faucet service configuration
///
/// Amounts are decimal wei strings, matching the on-wire representation
/// used everywhere else in the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetConfig {
    /// Server address
    pub server_addr: String,

    /// Database path
    pub db_path: String,

    /// Amount dispensed per free-tier grant (in wei)
    pub free_amount: String,

    /// Amount dispensed per premium grant (in wei)
    pub premium_amount: String,

    /// Price of one premium grant (in wei of the payment currency)
    pub premium_price: String,

    /// Cooldown between free-tier grants for the same agent (seconds)
    pub cooldown_secs: u64,

    /// Global flood limit on the free tier (requests per hour)
    pub max_free_requests_per_hour: u32,

    /// Timeout for the external payment verifier call (seconds)
    pub verifier_timeout_secs: u64,

    /// Address agents send premium payments and deposits to
    pub payment_address: String,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins
    pub allowed_origins: Vec<String>,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:3000".to_string(),
            db_path: "./faucet_data".to_string(),
            free_amount: "10000000000000000000".to_string(), // 10 tokens
            premium_amount: "100000000000000000000".to_string(), // 100 tokens
            premium_price: "1000000000000000".to_string(),   // 0.001 ETH
            cooldown_secs: 86400,                            // 24 hours
            max_free_requests_per_hour: 120,
            verifier_timeout_secs: 10,
            payment_address: "0x2f134373561052bCD4ED8cba44AB66637b7bee0B".to_string(),
            cors_enabled: true,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl FaucetConfig {
    /// Load from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("FAUCET_SERVER_ADDR") {
            config.server_addr = addr;
        }

        if let Ok(db_path) = std::env::var("FAUCET_DB_PATH") {
            config.db_path = db_path;
        }

        if let Ok(amount) = std::env::var("FAUCET_FREE_AMOUNT") {
            config.free_amount = amount;
        }

        if let Ok(amount) = std::env::var("FAUCET_PREMIUM_AMOUNT") {
            config.premium_amount = amount;
        }

        if let Ok(price) = std::env::var("FAUCET_PREMIUM_PRICE") {
            config.premium_price = price;
        }

        if let Ok(cooldown) = std::env::var("FAUCET_COOLDOWN_SECS") {
            config.cooldown_secs = cooldown.parse().unwrap_or(config.cooldown_secs);
        }

        if let Ok(max_req) = std::env::var("FAUCET_MAX_FREE_PER_HOUR") {
            config.max_free_requests_per_hour =
                max_req.parse().unwrap_or(config.max_free_requests_per_hour);
        }

        if let Ok(timeout) = std::env::var("FAUCET_VERIFIER_TIMEOUT_SECS") {
            config.verifier_timeout_secs =
                timeout.parse().unwrap_or(config.verifier_timeout_secs);
        }

        if let Ok(addr) = std::env::var("FAUCET_PAYMENT_ADDRESS") {
            config.payment_address = addr;
        }

        config
    }

    /// Cooldown window as a duration
    pub fn cooldown_window(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Verifier call timeout as a duration
    pub fn verifier_timeout(&self) -> Duration {
        Duration::from_secs(self.verifier_timeout_secs)
    }
}
