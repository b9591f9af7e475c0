//! Integration tests where the settlement aggregator and the claim lifecycle
//! manager write the same bridge transfer requests

use bridge_settlement::chain::FeeOracle;
use bridge_settlement::claims::{AuthenticatorSlot, ClaimManager};
use bridge_settlement::config::{ClaimsConfig, SettlementConfig};
use bridge_settlement::lookup::{DepositLookup, StorageDepositLookup};
use bridge_settlement::settlement::SettlementAggregator;
use bridge_settlement::storage::{InMemoryStore, Storage};
use bridge_settlement::types::{Account, ClaimStatus, Role};
use bridge_settlement::workflow::TokioClock;
use ethers::types::Address;
use std::sync::Arc;
use std::time::Duration;

#[path = "helpers.rs"]
mod helpers;
use helpers::{
    bridge_contract, identity, transfer, MockChain, RecordingNotifier, AUTHENTICATOR_KEY,
    CONTRACT_VERSION, OPERATOR_KEY,
};

/// 1. Test: Payout And Claim On One Request
/// Verifies that a payout flushed after a claim was issued keeps the request
/// Pending, and that the later expiry keeps the payout hash.
/// Why: Each process owns one field; a stale copy must never overwrite the other's write.
#[tokio::test(start_paused = true)]
async fn test_payout_and_claim_writes_do_not_clobber() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(InMemoryStore::new());
    let fees = Arc::new(FeeOracle::new());
    let payer = Arc::new(identity(OPERATOR_KEY));

    let authenticator = identity(AUTHENTICATOR_KEY).address();
    let mut account = Account::new(authenticator);
    account.roles.insert(Role::Authenticator);
    store.insert_account(account).await;
    let slot = Arc::new(AuthenticatorSlot::new(store.clone()));
    slot.set_current(authenticator, AUTHENTICATOR_KEY).await.unwrap();

    let (aggregator, handle) = SettlementAggregator::new(
        chain.clone(),
        store.clone(),
        fees.clone(),
        payer.clone(),
        bridge_contract(),
        500_000,
        SettlementConfig::default(),
        Arc::new(TokioClock::new()),
    );
    let process = tokio::spawn(aggregator.run());

    let lookup: Arc<dyn DepositLookup> = Arc::new(StorageDepositLookup::new(store.clone()));
    let manager = Arc::new(ClaimManager::new(
        lookup,
        store.clone(),
        slot,
        Arc::new(RecordingNotifier::default()),
        chain.clone(),
        fees,
        payer,
        bridge_contract(),
        300_000,
        ClaimsConfig {
            expiry_delay_secs: 180,
            contract_version: CONTRACT_VERSION.to_string(),
            lookup_timeout_ms: 30_000,
        },
    ));

    let deposit = transfer(9, Address::repeat_byte(0x71));
    store.upsert_bridge_transfer(&deposit).await.unwrap();
    // The queued copy still says Unconfirmed
    handle.enqueue_payout(deposit.clone()).await.unwrap();
    manager
        .prepare_claim(&deposit.deposit_tx_hash, deposit.destination_wallet_addr, CONTRACT_VERSION)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(61)).await;
    let payout_hash = chain.submissions()[0].tx_hash.clone();
    let stored = store.get_bridge_transfer(&deposit.id).await.unwrap().unwrap();
    assert_eq!(stored.claim_status, ClaimStatus::Pending);
    assert_eq!(stored.payout_tx_hash.as_deref(), Some(payout_hash.as_str()));

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(chain.submissions().len(), 2, "payout then invalidation");
    let stored = store.get_bridge_transfer(&deposit.id).await.unwrap().unwrap();
    assert_eq!(stored.claim_status, ClaimStatus::Expired);
    assert_eq!(stored.payout_tx_hash.as_deref(), Some(payout_hash.as_str()));

    process.abort();
}
