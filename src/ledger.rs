//! Balance ledger: deposit and deduction logic over the ledger store
//!
//! Owns the account rows and the deposit/spend history. Same-agent
//! mutations are serialized through a bounded per-agent lock table, and
//! every mutation is a single store transaction, so the accounting
//! identity (`balance == total_deposited - total_spent`) survives
//! concurrent use.

use crate::database::{AgentAccount, DepositKind, LedgerStore};
use crate::error::{FaucetError, FaucetResult};
use crate::verify::DepositPolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Point-in-time view of an agent's account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub agent_name: String,
    pub balance: u128,
    pub total_deposited: u128,
    pub total_spent: u128,
    pub last_deposit_tx: Option<String>,
    pub last_deposit_time: Option<i64>,
    pub has_balance: bool,
    pub can_use_premium: bool,
}

impl AccountSnapshot {
    fn empty(agent_name: &str) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            balance: 0,
            total_deposited: 0,
            total_spent: 0,
            last_deposit_tx: None,
            last_deposit_time: None,
            has_balance: false,
            can_use_premium: false,
        }
    }
}

/// Balance ledger
pub struct BalanceLedger {
    store: Arc<LedgerStore>,
    deposit_policy: Arc<dyn DepositPolicy>,
    /// Per-agent locks so check-then-mutate sequences on one account
    /// never interleave; cross-agent operations do not contend
    locks: moka::sync::Cache<String, Arc<Mutex<()>>>,
}

impl BalanceLedger {
    pub fn new(store: Arc<LedgerStore>, deposit_policy: Arc<dyn DepositPolicy>) -> Self {
        Self {
            store,
            deposit_policy,
            locks: moka::sync::Cache::new(10_000),
        }
    }

    fn agent_lock(&self, agent_name: &str) -> Arc<Mutex<()>> {
        self.locks
            .get_with(agent_name.to_string(), || Arc::new(Mutex::new(())))
    }

    /// Credit a verified deposit.
    ///
    /// Creates the account on first deposit. Rejects zero amounts, empty
    /// references and references failing the authenticity policy with
    /// `InvalidDeposit`; replaying an already-recorded reference fails
    /// with `DuplicateDepositReference`. No mutation on any rejection.
    pub async fn deposit(
        &self,
        agent_name: &str,
        amount: u128,
        tx_reference: &str,
    ) -> FaucetResult<AgentAccount> {
        if amount == 0 {
            return Err(FaucetError::InvalidDeposit(
                "deposit amount must be positive".to_string(),
            ));
        }
        if tx_reference.trim().is_empty() {
            return Err(FaucetError::InvalidDeposit(
                "deposit transaction reference required".to_string(),
            ));
        }
        if let Err(reason) = self.deposit_policy.check(tx_reference) {
            warn!("Deposit rejected: agent={} tx={}: {}", agent_name, tx_reference, reason);
            return Err(FaucetError::InvalidDeposit(reason));
        }

        let lock = self.agent_lock(agent_name);
        let _guard = lock.lock().await;

        let account =
            self.store
                .apply_deposit(agent_name, amount, tx_reference, DepositKind::Deposit)?;

        info!(
            "Deposit recorded: agent={} amount={} tx={} balance={}",
            agent_name, amount, tx_reference, account.balance
        );

        Ok(account)
    }

    /// Compensating credit after a disbursement failed post-deduction.
    ///
    /// Recorded distinctly from a normal deposit so reconciliation can
    /// tell the two apart.
    pub async fn credit_compensation(
        &self,
        agent_name: &str,
        amount: u128,
        request_id: &str,
    ) -> FaucetResult<AgentAccount> {
        let lock = self.agent_lock(agent_name);
        let _guard = lock.lock().await;

        let reference = format!("REFUND:{}", request_id);
        let account = self.store.apply_deposit(
            agent_name,
            amount,
            &reference,
            DepositKind::Compensation,
        )?;

        warn!(
            "Compensating credit issued: agent={} amount={} request={} balance={}",
            agent_name, amount, request_id, account.balance
        );

        Ok(account)
    }

    /// Current balance; 0 for unknown agents
    pub fn balance(&self, agent_name: &str) -> FaucetResult<u128> {
        Ok(self
            .store
            .account(agent_name)?
            .map(|a| a.balance)
            .unwrap_or(0))
    }

    /// Debit the account for a service.
    ///
    /// Fails with `InsufficientBalance` (carrying the shortfall) without
    /// mutating anything when the balance cannot cover `amount`.
    pub async fn deduct(
        &self,
        agent_name: &str,
        amount: u128,
        service_type: &str,
        request_id: Option<&str>,
    ) -> FaucetResult<AgentAccount> {
        if amount == 0 {
            return Err(FaucetError::InvalidAmount(
                "deduction amount must be positive".to_string(),
            ));
        }

        let lock = self.agent_lock(agent_name);
        let _guard = lock.lock().await;

        let account = self
            .store
            .apply_deduction(agent_name, amount, service_type, request_id)?;

        info!(
            "Balance deducted: agent={} amount={} service={} remaining={}",
            agent_name, amount, service_type, account.balance
        );

        Ok(account)
    }

    /// Full account view; zero-valued for unknown agents
    pub fn balance_info(
        &self,
        agent_name: &str,
        premium_price: u128,
    ) -> FaucetResult<AccountSnapshot> {
        let account = match self.store.account(agent_name)? {
            Some(account) => account,
            None => return Ok(AccountSnapshot::empty(agent_name)),
        };

        Ok(AccountSnapshot {
            agent_name: account.agent_name,
            balance: account.balance,
            total_deposited: account.total_deposited,
            total_spent: account.total_spent,
            last_deposit_tx: account.last_deposit_tx,
            last_deposit_time: account.last_deposit_time,
            has_balance: account.balance > 0,
            can_use_premium: account.balance >= premium_price,
        })
    }
}
