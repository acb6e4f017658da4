//! Tiered faucet service for autonomous agents
//!
//! Dispenses a testnet token under two service tiers:
//! - a free tier, rate-limited by a per-agent cooldown window
//! - a paid tier, satisfied per request (verified payment reference) or
//!   from a pre-funded agent balance debited per use
//!
//! The core is the account ledger and tier access control: per-agent
//! balances with append-only deposit/spend history, deposit idempotency,
//! atomic conditional deductions, and fail-closed tier decisions. Chain
//! verification, identity verification and token disbursement are
//! consumed as swappable capabilities.

pub mod api;
pub mod config;
pub mod cooldown;
pub mod database;
pub mod disburse;
pub mod error;
pub mod ledger;
pub mod service;
pub mod verify;

pub use config::FaucetConfig;
pub use cooldown::CooldownTracker;
pub use database::{
    AgentAccount, DepositKind, DepositRecord, LedgerStatistics, LedgerStore, SpendRecord,
};
pub use disburse::{DevDisburser, Disburser};
pub use error::{FaucetError, FaucetResult};
pub use ledger::{AccountSnapshot, BalanceLedger};
pub use service::{FaucetService, FaucetStatus, GrantOutcome, Tier};
pub use verify::{
    AgentVerifier, DepositPolicy, DevAgentVerifier, DevPaymentVerifier, PaymentCheck,
    PaymentVerifier, PrefixDepositPolicy,
};
