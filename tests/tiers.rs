//! End-to-end tier lifecycle against a temporary ledger store

use agent_faucet::{
    BalanceLedger, DepositKind, DevAgentVerifier, DevDisburser, DevPaymentVerifier, FaucetConfig,
    FaucetError, FaucetService, LedgerStore, PrefixDepositPolicy, Tier,
};
use std::sync::Arc;
use tempfile::TempDir;

const WEI_0_001: u128 = 1_000_000_000_000_000;

fn test_address() -> String {
    format!("0x{}", "cd".repeat(20))
}

fn start_service() -> (Arc<FaucetService>, Arc<LedgerStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = FaucetConfig {
        db_path: dir.path().to_string_lossy().into_owned(),
        free_amount: "10000000000000000000".to_string(),
        premium_amount: "100000000000000000000".to_string(),
        premium_price: WEI_0_001.to_string(),
        cooldown_secs: 3600,
        max_free_requests_per_hour: 100_000,
        verifier_timeout_secs: 2,
        ..FaucetConfig::default()
    };

    let store = Arc::new(LedgerStore::open(dir.path()).unwrap());
    let ledger = BalanceLedger::new(
        Arc::clone(&store),
        Arc::new(PrefixDepositPolicy::default()),
    );
    let service = FaucetService::new(
        config,
        Arc::clone(&store),
        ledger,
        Arc::new(DevAgentVerifier),
        Arc::new(DevPaymentVerifier),
        Arc::new(DevDisburser::default()),
    )
    .unwrap();

    (Arc::new(service), store, dir)
}

#[tokio::test]
async fn free_tier_lifecycle() {
    let (service, store, _dir) = start_service();

    let outcome = service
        .request_free("ci-agent", &test_address())
        .await
        .unwrap();
    assert_eq!(outcome.tier, Tier::Free);
    assert_eq!(outcome.amount, "10000000000000000000");
    assert!(outcome.receipt.starts_with("0x"));

    // The grant was recorded and the agent is now in cooldown
    assert!(store.last_grant("ci-agent").unwrap().is_some());
    let err = service
        .request_free("ci-agent", &test_address())
        .await
        .unwrap_err();
    assert!(matches!(err, FaucetError::CooldownActive { .. }));

    // A different agent is unaffected
    service
        .request_free("other-agent", &test_address())
        .await
        .unwrap();
}

#[tokio::test]
async fn premium_tier_lifecycle() {
    let (service, _store, _dir) = start_service();

    // Bad payment reference is rejected before anything happens
    let err = service
        .request_premium("ci-agent", &test_address(), "0xBOGUS")
        .await
        .unwrap_err();
    assert!(matches!(err, FaucetError::PaymentNotVerified(_)));

    // A recognized payment buys the premium amount, cooldown-free
    for i in 0..3 {
        let outcome = service
            .request_premium("ci-agent", &test_address(), &format!("0xPAID-{}", i))
            .await
            .unwrap();
        assert_eq!(outcome.tier, Tier::Premium);
        assert_eq!(outcome.paid_amount.as_deref(), Some(&WEI_0_001.to_string()[..]));
    }
}

#[tokio::test]
async fn balance_tier_lifecycle() {
    let (service, store, _dir) = start_service();

    // Deposit twice, second reuse of the reference is a no-credit conflict
    let snapshot = service
        .deposit("ci-agent", 2 * WEI_0_001, "0xDEPOSIT-A")
        .await
        .unwrap();
    assert_eq!(snapshot.balance, 2 * WEI_0_001);
    assert!(snapshot.can_use_premium);

    let err = service
        .deposit("ci-agent", 2 * WEI_0_001, "0xDEPOSIT-A")
        .await
        .unwrap_err();
    assert!(matches!(err, FaucetError::DuplicateDepositReference(_)));
    assert_eq!(service.balance_info("ci-agent").unwrap().balance, 2 * WEI_0_001);

    // Two balance-funded grants drain the account
    let outcome = service
        .request_balance("ci-agent", &test_address())
        .await
        .unwrap();
    assert_eq!(outcome.tier, Tier::Balance);
    assert_eq!(outcome.balance_after.as_deref(), Some(&WEI_0_001.to_string()[..]));

    service
        .request_balance("ci-agent", &test_address())
        .await
        .unwrap();

    // Third attempt fails with the exact shortfall and no mutation
    let err = service
        .request_balance("ci-agent", &test_address())
        .await
        .unwrap_err();
    match err {
        FaucetError::InsufficientBalance { required, shortfall } => {
            assert_eq!(required, WEI_0_001);
            assert_eq!(shortfall, WEI_0_001);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let info = service.balance_info("ci-agent").unwrap();
    assert_eq!(info.balance, 0);
    assert_eq!(info.total_deposited, 2 * WEI_0_001);
    assert_eq!(info.total_spent, 2 * WEI_0_001);
    assert!(!info.can_use_premium);

    // History: one real deposit, two premium_tier spends, no compensations
    let deposits = store.deposits_for("ci-agent").unwrap();
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0].kind, DepositKind::Deposit);

    let spends = store.spending_for("ci-agent").unwrap();
    assert_eq!(spends.len(), 2);
    assert!(spends.iter().all(|s| s.service_type == "premium_tier"));
    assert!(spends.iter().all(|s| s.request_id.is_some()));
}

#[tokio::test]
async fn unknown_agent_reads_are_zeroed() {
    let (service, _store, _dir) = start_service();

    let info = service.balance_info("nobody").unwrap();
    assert_eq!(info.balance, 0);
    assert!(!info.has_balance);
    assert!(!info.can_use_premium);
}
