//! Tier access controller
//!
//! Decides, per request, whether an agent earns a disbursement under the
//! free, pay-per-request or balance-funded tier, performs the ledger
//! mutation that goes with it, and returns a structured outcome. Holds no
//! persistent state of its own.

use crate::config::FaucetConfig;
use crate::cooldown::CooldownTracker;
use crate::database::{LedgerStatistics, LedgerStore};
use crate::disburse::Disburser;
use crate::error::{FaucetError, FaucetResult};
use crate::ledger::{AccountSnapshot, BalanceLedger};
use crate::verify::{validate_address, validate_agent_name, AgentVerifier, PaymentVerifier};
use chrono::Utc;
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Service tier a grant was issued under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
    Balance,
}

/// Outcome of an authorized service request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantOutcome {
    pub tier: Tier,
    pub agent_name: String,
    pub address: String,
    /// Amount granted, in wei
    pub amount: String,
    /// Disbursement receipt
    pub receipt: String,
    /// Payment reference (pay-per-request tier only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_tx: Option<String>,
    /// Verified payment amount in wei (pay-per-request tier only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_amount: Option<String>,
    /// Remaining balance in wei (balance-funded tier only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<String>,
}

/// Faucet status for the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetStatus {
    pub free_amount: String,
    pub premium_amount: String,
    pub premium_price: String,
    pub payment_address: String,
    pub cooldown_secs: u64,
    pub ledger: LedgerStatistics,
}

type FloodLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Tier access controller over the ledger, cooldown tracker and the
/// external verification/disbursement capabilities
pub struct FaucetService {
    config: FaucetConfig,
    store: Arc<LedgerStore>,
    ledger: BalanceLedger,
    cooldown: CooldownTracker,
    agent_verifier: Arc<dyn AgentVerifier>,
    payment_verifier: Arc<dyn PaymentVerifier>,
    disburser: Arc<dyn Disburser>,
    flood_limiter: FloodLimiter,
    flood_clock: DefaultClock,
    /// Per-agent locks held across the free path's cooldown check,
    /// disbursement and grant record so concurrent free requests for one
    /// agent cannot both pass the check
    free_locks: moka::sync::Cache<String, Arc<Mutex<()>>>,
    free_amount: u128,
    premium_amount: u128,
    premium_price: u128,
}

fn parse_wei(name: &str, value: &str) -> FaucetResult<u128> {
    value.parse::<u128>().map_err(|_| {
        FaucetError::InvalidAmount(format!("{} must be a decimal wei string, got {:?}", name, value))
    })
}

impl FaucetService {
    pub fn new(
        config: FaucetConfig,
        store: Arc<LedgerStore>,
        ledger: BalanceLedger,
        agent_verifier: Arc<dyn AgentVerifier>,
        payment_verifier: Arc<dyn PaymentVerifier>,
        disburser: Arc<dyn Disburser>,
    ) -> FaucetResult<Self> {
        let free_amount = parse_wei("free_amount", &config.free_amount)?;
        let premium_amount = parse_wei("premium_amount", &config.premium_amount)?;
        let premium_price = parse_wei("premium_price", &config.premium_price)?;

        if premium_price == 0 {
            return Err(FaucetError::InvalidAmount(
                "premium_price must be positive".to_string(),
            ));
        }

        let quota = Quota::per_hour(
            NonZeroU32::new(config.max_free_requests_per_hour)
                .unwrap_or(NonZeroU32::new(60).unwrap()),
        );
        let flood_clock = DefaultClock::default();
        let flood_limiter = RateLimiter::direct_with_clock(quota, &flood_clock);

        let cooldown = CooldownTracker::new(Arc::clone(&store));

        Ok(Self {
            config,
            store,
            ledger,
            cooldown,
            agent_verifier,
            payment_verifier,
            disburser,
            flood_limiter,
            flood_clock,
            free_locks: moka::sync::Cache::new(10_000),
            free_amount,
            premium_amount,
            premium_price,
        })
    }

    pub fn config(&self) -> &FaucetConfig {
        &self.config
    }

    /// Free tier: cooldown-gated, identity-verified, fixed small amount
    pub async fn request_free(&self, agent_name: &str, address: &str) -> FaucetResult<GrantOutcome> {
        validate_agent_name(agent_name)?;
        validate_address(address)?;

        self.flood_limiter.check().map_err(|not_until| {
            let wait = not_until.wait_time_from(self.flood_clock.now());
            FaucetError::RateLimitExceeded(wait.as_secs().max(1))
        })?;

        // Held across check, disbursement and record: the cooldown window
        // must admit exactly one in-flight free grant per agent
        let lock = self
            .free_locks
            .get_with(agent_name.to_string(), || Arc::new(Mutex::new(())));
        let _guard = lock.lock().await;

        if let Some(remaining) = self
            .cooldown
            .remaining(agent_name, self.config.cooldown_window())?
        {
            warn!(
                "Free tier rejected, cooldown active: agent={} remaining={}s",
                agent_name,
                remaining.as_secs()
            );
            return Err(FaucetError::CooldownActive {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        if !self.agent_verifier.verify_agent(agent_name).await? {
            warn!("Free tier rejected, verification failed: agent={}", agent_name);
            return Err(FaucetError::VerificationFailed(format!(
                "agent {:?} was not accepted",
                agent_name
            )));
        }

        let receipt = self.disburser.disburse(address, self.free_amount).await?;
        self.cooldown.record_grant(agent_name, Utc::now().timestamp())?;

        info!(
            "Free grant issued: agent={} address={} amount={} receipt={}",
            agent_name, address, self.free_amount, receipt
        );

        Ok(GrantOutcome {
            tier: Tier::Free,
            agent_name: agent_name.to_string(),
            address: address.to_string(),
            amount: self.free_amount.to_string(),
            receipt,
            payment_tx: None,
            paid_amount: None,
            balance_after: None,
        })
    }

    /// Pay-per-request tier: a verified payment is the gate; identity
    /// verification is intentionally skipped on this path.
    pub async fn request_premium(
        &self,
        agent_name: &str,
        address: &str,
        payment_tx: &str,
    ) -> FaucetResult<GrantOutcome> {
        validate_agent_name(agent_name)?;
        validate_address(address)?;

        if payment_tx.trim().is_empty() {
            return Err(FaucetError::PaymentNotVerified(
                "payment transaction reference required".to_string(),
            ));
        }

        let check = match tokio::time::timeout(
            self.config.verifier_timeout(),
            self.payment_verifier
                .verify_payment(payment_tx, self.premium_price),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Payment verification timed out: agent={} tx={}",
                    agent_name, payment_tx
                );
                return Err(FaucetError::VerificationTimeout);
            }
        };

        if !check.verified {
            warn!(
                "Premium rejected, payment not verified: agent={} tx={}",
                agent_name, payment_tx
            );
            return Err(FaucetError::PaymentNotVerified(
                check
                    .error
                    .unwrap_or_else(|| "payment could not be verified".to_string()),
            ));
        }

        let receipt = self
            .disburser
            .disburse(address, self.premium_amount)
            .await?;

        info!(
            "Premium grant issued: agent={} address={} amount={} payment_tx={} paid={} receipt={}",
            agent_name, address, self.premium_amount, payment_tx, check.amount, receipt
        );

        Ok(GrantOutcome {
            tier: Tier::Premium,
            agent_name: agent_name.to_string(),
            address: address.to_string(),
            amount: self.premium_amount.to_string(),
            receipt,
            payment_tx: Some(payment_tx.to_string()),
            paid_amount: Some(check.amount.to_string()),
            balance_after: None,
        })
    }

    /// Balance-funded tier: debit the pre-funded account, then disburse.
    /// A disbursement failure after the debit triggers an equal
    /// compensating credit so the funds are never silently lost.
    pub async fn request_balance(
        &self,
        agent_name: &str,
        address: &str,
    ) -> FaucetResult<GrantOutcome> {
        validate_agent_name(agent_name)?;
        validate_address(address)?;

        let request_id = self.store.next_request_id()?;
        let account = self
            .ledger
            .deduct(agent_name, self.premium_price, "premium_tier", Some(&request_id))
            .await?;

        match self.disburser.disburse(address, self.premium_amount).await {
            Ok(receipt) => {
                info!(
                    "Balance-funded grant issued: agent={} address={} amount={} remaining={} receipt={}",
                    agent_name, address, self.premium_amount, account.balance, receipt
                );

                Ok(GrantOutcome {
                    tier: Tier::Balance,
                    agent_name: agent_name.to_string(),
                    address: address.to_string(),
                    amount: self.premium_amount.to_string(),
                    receipt,
                    payment_tx: None,
                    paid_amount: None,
                    balance_after: Some(account.balance.to_string()),
                })
            }
            Err(err) => {
                error!(
                    "Disbursement failed after deduction, compensating: agent={} request={} err={}",
                    agent_name, request_id, err
                );

                let reason = match err {
                    FaucetError::DisbursementFailed(msg) => msg,
                    other => other.to_string(),
                };

                match self
                    .ledger
                    .credit_compensation(agent_name, self.premium_price, &request_id)
                    .await
                {
                    Ok(_) => Err(FaucetError::DisbursementFailed(reason)),
                    Err(comp_err) => {
                        error!(
                            "Compensating credit failed: agent={} request={} err={}",
                            agent_name, request_id, comp_err
                        );
                        Err(comp_err)
                    }
                }
            }
        }
    }

    /// Record a pre-funding deposit
    pub async fn deposit(
        &self,
        agent_name: &str,
        amount: u128,
        tx_reference: &str,
    ) -> FaucetResult<AccountSnapshot> {
        validate_agent_name(agent_name)?;

        self.ledger.deposit(agent_name, amount, tx_reference).await?;
        self.ledger.balance_info(agent_name, self.premium_price)
    }

    /// Account view for an agent; zero-valued for unknown agents
    pub fn balance_info(&self, agent_name: &str) -> FaucetResult<AccountSnapshot> {
        self.ledger.balance_info(agent_name, self.premium_price)
    }

    /// Service status and ledger counters
    pub fn status(&self) -> FaucetResult<FaucetStatus> {
        Ok(FaucetStatus {
            free_amount: self.free_amount.to_string(),
            premium_amount: self.premium_amount.to_string(),
            premium_price: self.premium_price.to_string(),
            payment_address: self.config.payment_address.clone(),
            cooldown_secs: self.config.cooldown_secs,
            ledger: self.store.statistics()?,
        })
    }

    /// Flush durable state, called on shutdown
    pub fn flush(&self) -> FaucetResult<()> {
        self.store.flush()
    }
}
