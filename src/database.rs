//! Ledger store: durable accounts, deposit/spend history and free-tier
//! grant tracking.
//!
//! This layer holds no tier policy. Every balance mutation runs as a
//! single sled transaction across the account tree and the relevant
//! history tree, so the conditional check and the write are atomic and
//! all-or-nothing even under concurrent requests.

use crate::error::{FaucetError, FaucetResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{IVec, Transactional, Tree};
use std::path::Path;
use tracing::{debug, info};

/// Per-agent account row
///
/// Invariant: `balance == total_deposited - total_spent` and all three
/// fields are unsigned, so the balance can never go negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAccount {
    pub agent_name: String,
    pub balance: u128,
    pub total_deposited: u128,
    pub total_spent: u128,
    pub last_deposit_tx: Option<String>,
    pub last_deposit_time: Option<i64>,
    pub created_at: i64,
}

impl AgentAccount {
    fn new(agent_name: &str, now: i64) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            balance: 0,
            total_deposited: 0,
            total_spent: 0,
            last_deposit_tx: None,
            last_deposit_time: None,
            created_at: now,
        }
    }
}

/// Why a deposit row was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositKind {
    /// Agent-submitted deposit backed by a payment transaction
    Deposit,
    /// Compensating credit issued after a failed disbursement
    Compensation,
}

/// Immutable deposit row, one per accepted credit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRecord {
    pub agent_name: String,
    pub amount: u128,
    pub tx_hash: String,
    pub kind: DepositKind,
    pub verified: bool,
    pub timestamp: i64,
}

/// Immutable spend row, one per successful deduction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendRecord {
    pub agent_name: String,
    pub amount: u128,
    pub service_type: String,
    pub request_id: Option<String>,
    pub timestamp: i64,
}

/// Store-wide counters for the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStatistics {
    pub accounts: usize,
    pub deposits: usize,
    pub spends: usize,
    pub grants: usize,
}

/// Durable ledger store
pub struct LedgerStore {
    db: sled::Db,
    /// Tree for agent accounts, keyed by agent name
    accounts: Tree,
    /// Tree for deposit history, keyed by `agent\0tx_hash` (the key
    /// layout enforces the per-agent deposit-reference uniqueness
    /// constraint)
    deposits: Tree,
    /// Tree for spend history, keyed by `agent\0seq`
    spending: Tree,
    /// Tree for free-tier grants (last grant timestamp per agent)
    grants: Tree,
}

fn encode<T: Serialize>(value: &T) -> FaucetResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| FaucetError::InternalError(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(raw: &[u8]) -> FaucetResult<T> {
    bincode::deserialize(raw).map_err(|e| FaucetError::InternalError(e.to_string()))
}

// NUL-separated history keys. Agent names are validated to contain no
// control characters at the service boundary, so the separator cannot
// appear inside the agent component and names with ':' or other
// punctuation never cross key spaces.
fn deposit_key(agent_name: &str, tx_hash: &str) -> Vec<u8> {
    format!("{}\0{}", agent_name, tx_hash).into_bytes()
}

fn spend_key(agent_name: &str, seq: u64) -> Vec<u8> {
    format!("{}\0{:020}", agent_name, seq).into_bytes()
}

fn history_prefix(agent_name: &str) -> Vec<u8> {
    format!("{}\0", agent_name).into_bytes()
}

impl LedgerStore {
    /// Create or open the ledger store
    pub fn open<P: AsRef<Path>>(path: P) -> FaucetResult<Self> {
        info!("Opening ledger store at: {}", path.as_ref().display());

        let db = sled::Config::default()
            .path(path)
            .open()
            .map_err(FaucetError::Storage)?;

        let accounts = db.open_tree("accounts").map_err(FaucetError::Storage)?;
        let deposits = db.open_tree("deposits").map_err(FaucetError::Storage)?;
        let spending = db.open_tree("spending").map_err(FaucetError::Storage)?;
        let grants = db.open_tree("grants").map_err(FaucetError::Storage)?;

        Ok(Self {
            db,
            accounts,
            deposits,
            spending,
            grants,
        })
    }

    /// Fetch an account row; `None` for agents with no ledger history
    pub fn account(&self, agent_name: &str) -> FaucetResult<Option<AgentAccount>> {
        match self.accounts.get(agent_name.as_bytes())? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Atomically credit an account and append the deposit row.
    ///
    /// Aborts with `DuplicateDepositReference` if `(agent_name, tx_hash)`
    /// was already recorded; no state changes in that case. The account
    /// row is created on first deposit.
    pub fn apply_deposit(
        &self,
        agent_name: &str,
        amount: u128,
        tx_hash: &str,
        kind: DepositKind,
    ) -> FaucetResult<AgentAccount> {
        let now = Utc::now().timestamp();
        let key = deposit_key(agent_name, tx_hash);

        let result = (&self.accounts, &self.deposits).transaction(|(accounts, deposits)| {
            if deposits.get(key.as_slice())?.is_some() {
                return Err(ConflictableTransactionError::Abort(
                    FaucetError::DuplicateDepositReference(tx_hash.to_string()),
                ));
            }

            let mut account = match accounts.get(agent_name.as_bytes())? {
                Some(raw) => decode::<AgentAccount>(&raw)
                    .map_err(ConflictableTransactionError::Abort)?,
                None => AgentAccount::new(agent_name, now),
            };

            account.balance = account.balance.checked_add(amount).ok_or_else(|| {
                ConflictableTransactionError::Abort(FaucetError::InternalError(
                    "balance overflow".to_string(),
                ))
            })?;
            account.total_deposited = account.total_deposited.saturating_add(amount);
            account.last_deposit_tx = Some(tx_hash.to_string());
            account.last_deposit_time = Some(now);

            let record = DepositRecord {
                agent_name: agent_name.to_string(),
                amount,
                tx_hash: tx_hash.to_string(),
                kind,
                verified: true,
                timestamp: now,
            };

            accounts.insert(
                agent_name.as_bytes(),
                encode(&account).map_err(ConflictableTransactionError::Abort)?,
            )?;
            deposits.insert(
                key.as_slice(),
                encode(&record).map_err(ConflictableTransactionError::Abort)?,
            )?;

            Ok(account)
        });

        let account = result.map_err(|e| match e {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => FaucetError::Storage(err),
        })?;

        debug!(
            "Deposit applied: agent={} amount={} tx={} balance={}",
            agent_name, amount, tx_hash, account.balance
        );

        Ok(account)
    }

    /// Atomically debit an account and append the spend row.
    ///
    /// The balance check runs inside the transaction, so two concurrent
    /// deductions can never both succeed past the available balance.
    /// Aborts with `InsufficientBalance` (carrying the shortfall) without
    /// any mutation when the account cannot cover `amount`.
    pub fn apply_deduction(
        &self,
        agent_name: &str,
        amount: u128,
        service_type: &str,
        request_id: Option<&str>,
    ) -> FaucetResult<AgentAccount> {
        let now = Utc::now().timestamp();
        let seq = self.db.generate_id()?;
        let key = spend_key(agent_name, seq);

        let result = (&self.accounts, &self.spending).transaction(|(accounts, spending)| {
            let account = match accounts.get(agent_name.as_bytes())? {
                Some(raw) => Some(
                    decode::<AgentAccount>(&raw).map_err(ConflictableTransactionError::Abort)?,
                ),
                None => None,
            };

            let balance = account.as_ref().map(|a| a.balance).unwrap_or(0);
            if balance < amount {
                return Err(ConflictableTransactionError::Abort(
                    FaucetError::InsufficientBalance {
                        required: amount,
                        shortfall: amount - balance,
                    },
                ));
            }

            // balance >= amount > 0 implies the account row exists
            let mut account = account.ok_or_else(|| {
                ConflictableTransactionError::Abort(FaucetError::InternalError(
                    "account missing despite positive balance".to_string(),
                ))
            })?;

            account.balance -= amount;
            account.total_spent = account.total_spent.saturating_add(amount);

            let record = SpendRecord {
                agent_name: agent_name.to_string(),
                amount,
                service_type: service_type.to_string(),
                request_id: request_id.map(|s| s.to_string()),
                timestamp: now,
            };

            accounts.insert(
                agent_name.as_bytes(),
                encode(&account).map_err(ConflictableTransactionError::Abort)?,
            )?;
            spending.insert(
                key.as_slice(),
                encode(&record).map_err(ConflictableTransactionError::Abort)?,
            )?;

            Ok(account)
        });

        let account = result.map_err(|e| match e {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => FaucetError::Storage(err),
        })?;

        debug!(
            "Deduction applied: agent={} amount={} service={} balance={}",
            agent_name, amount, service_type, account.balance
        );

        Ok(account)
    }

    /// Deposit history for an agent, newest first
    pub fn deposits_for(&self, agent_name: &str) -> FaucetResult<Vec<DepositRecord>> {
        let mut records = Vec::new();

        for item in self.deposits.scan_prefix(history_prefix(agent_name)) {
            let (_, value) = item.map_err(FaucetError::Storage)?;
            records.push(decode::<DepositRecord>(&value)?);
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// Spend history for an agent, newest first
    pub fn spending_for(&self, agent_name: &str) -> FaucetResult<Vec<SpendRecord>> {
        let mut records = Vec::new();

        for item in self.spending.scan_prefix(history_prefix(agent_name)) {
            let (_, value) = item.map_err(FaucetError::Storage)?;
            records.push(decode::<SpendRecord>(&value)?);
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// Last free-tier grant timestamp for an agent
    pub fn last_grant(&self, agent_name: &str) -> FaucetResult<Option<i64>> {
        match self.grants.get(agent_name.as_bytes())? {
            Some(bytes) => {
                let timestamp = i64::from_be_bytes(bytes.as_ref().try_into().map_err(|_| {
                    FaucetError::InternalError("Invalid grant timestamp format".to_string())
                })?);
                Ok(Some(timestamp))
            }
            None => Ok(None),
        }
    }

    /// Record a free-tier grant timestamp for an agent
    pub fn put_grant(&self, agent_name: &str, timestamp: i64) -> FaucetResult<()> {
        self.grants.insert(
            agent_name.as_bytes(),
            IVec::from(timestamp.to_be_bytes().as_slice()),
        )?;
        Ok(())
    }

    /// Fresh id for correlating a spend with its service request
    pub fn next_request_id(&self) -> FaucetResult<String> {
        Ok(format!("req-{}", self.db.generate_id()?))
    }

    /// Store-wide counters
    pub fn statistics(&self) -> FaucetResult<LedgerStatistics> {
        Ok(LedgerStatistics {
            accounts: self.accounts.len(),
            deposits: self.deposits.len(),
            spends: self.spending.len(),
            grants: self.grants.len(),
        })
    }

    /// Flush all trees to disk
    pub fn flush(&self) -> FaucetResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (LedgerStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn test_deposit_creates_account() {
        let (store, _dir) = open_store();

        let account = store
            .apply_deposit("alice", 2_000, "0xDEPOSIT1", DepositKind::Deposit)
            .unwrap();

        assert_eq!(account.balance, 2_000);
        assert_eq!(account.total_deposited, 2_000);
        assert_eq!(account.total_spent, 0);
        assert_eq!(account.last_deposit_tx.as_deref(), Some("0xDEPOSIT1"));
    }

    #[test]
    fn test_duplicate_deposit_reference_rejected() {
        let (store, _dir) = open_store();

        store
            .apply_deposit("alice", 2_000, "0xDEPOSIT1", DepositKind::Deposit)
            .unwrap();
        let err = store
            .apply_deposit("alice", 2_000, "0xDEPOSIT1", DepositKind::Deposit)
            .unwrap_err();

        assert!(matches!(err, FaucetError::DuplicateDepositReference(_)));
        // Credited exactly once
        assert_eq!(store.account("alice").unwrap().unwrap().balance, 2_000);
        assert_eq!(store.deposits_for("alice").unwrap().len(), 1);
    }

    #[test]
    fn test_same_reference_different_agents_allowed() {
        let (store, _dir) = open_store();

        store
            .apply_deposit("alice", 1_000, "0xDEPOSIT1", DepositKind::Deposit)
            .unwrap();
        store
            .apply_deposit("bob", 1_000, "0xDEPOSIT1", DepositKind::Deposit)
            .unwrap();

        assert_eq!(store.account("bob").unwrap().unwrap().balance, 1_000);
    }

    #[test]
    fn test_deduction_requires_funds() {
        let (store, _dir) = open_store();

        let err = store
            .apply_deduction("alice", 500, "premium_tier", None)
            .unwrap_err();
        match err {
            FaucetError::InsufficientBalance { required, shortfall } => {
                assert_eq!(required, 500);
                assert_eq!(shortfall, 500);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // No partial state was written
        assert!(store.account("alice").unwrap().is_none());
        assert!(store.spending_for("alice").unwrap().is_empty());
    }

    #[test]
    fn test_accounting_identity_holds() {
        let (store, _dir) = open_store();

        store
            .apply_deposit("alice", 5_000, "0xDEPOSIT1", DepositKind::Deposit)
            .unwrap();
        store
            .apply_deposit("alice", 3_000, "0xDEPOSIT2", DepositKind::Deposit)
            .unwrap();
        store.apply_deduction("alice", 4_000, "premium_tier", None).unwrap();
        let account = store
            .apply_deduction("alice", 1_500, "premium_tier", None)
            .unwrap();

        assert_eq!(account.total_deposited, 8_000);
        assert_eq!(account.total_spent, 5_500);
        assert_eq!(
            account.balance,
            account.total_deposited - account.total_spent
        );
    }

    #[test]
    fn test_failed_deduction_leaves_balance_unchanged() {
        let (store, _dir) = open_store();

        store
            .apply_deposit("alice", 1_000, "0xDEPOSIT1", DepositKind::Deposit)
            .unwrap();
        let err = store
            .apply_deduction("alice", 1_001, "premium_tier", None)
            .unwrap_err();

        assert!(matches!(
            err,
            FaucetError::InsufficientBalance { shortfall: 1, .. }
        ));
        assert_eq!(store.account("alice").unwrap().unwrap().balance, 1_000);
        assert!(store.spending_for("alice").unwrap().is_empty());
    }

    #[test]
    fn test_history_keys_do_not_cross_between_agents() {
        let (store, _dir) = open_store();

        // "a" is a strict prefix of "a:evil"; with punctuation-bearing
        // names the histories must still stay disjoint
        store
            .apply_deposit("a", 1_000, "0xDEPOSIT1", DepositKind::Deposit)
            .unwrap();
        store
            .apply_deposit("a:evil", 2_000, "0xDEPOSIT2", DepositKind::Deposit)
            .unwrap();
        store.apply_deduction("a", 100, "premium_tier", None).unwrap();
        store
            .apply_deduction("a:evil", 200, "premium_tier", None)
            .unwrap();

        let deposits = store.deposits_for("a").unwrap();
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].agent_name, "a");
        assert_eq!(deposits[0].amount, 1_000);

        let spends = store.spending_for("a").unwrap();
        assert_eq!(spends.len(), 1);
        assert_eq!(spends[0].agent_name, "a");
        assert_eq!(spends[0].amount, 100);

        assert_eq!(store.deposits_for("a:evil").unwrap().len(), 1);
        assert_eq!(store.account("a").unwrap().unwrap().balance, 900);
        assert_eq!(store.account("a:evil").unwrap().unwrap().balance, 1_800);
    }

    #[test]
    fn test_grant_roundtrip() {
        let (store, _dir) = open_store();

        assert_eq!(store.last_grant("alice").unwrap(), None);
        store.put_grant("alice", 1_700_000_000).unwrap();
        assert_eq!(store.last_grant("alice").unwrap(), Some(1_700_000_000));

        // Later grant overwrites
        store.put_grant("alice", 1_700_000_500).unwrap();
        assert_eq!(store.last_grant("alice").unwrap(), Some(1_700_000_500));
    }

    #[test]
    fn test_statistics_counts() {
        let (store, _dir) = open_store();

        store
            .apply_deposit("alice", 1_000, "0xDEPOSIT1", DepositKind::Deposit)
            .unwrap();
        store.apply_deduction("alice", 400, "premium_tier", None).unwrap();
        store.put_grant("bob", 1_700_000_000).unwrap();

        let stats = store.statistics().unwrap();
        assert_eq!(stats.accounts, 1);
        assert_eq!(stats.deposits, 1);
        assert_eq!(stats.spends, 1);
        assert_eq!(stats.grants, 1);
    }
}
