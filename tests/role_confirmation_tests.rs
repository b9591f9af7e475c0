//! Integration tests for the role confirmation engine
//!
//! Poll-strategy runs use the paused tokio clock so the one-hour polling
//! ceiling is reached in virtual time.

use bridge_settlement::chain::FeeOracle;
use bridge_settlement::config::ConfirmationStrategy;
use bridge_settlement::error::BridgeError;
use bridge_settlement::roles::RoleEngine;
use bridge_settlement::storage::{InMemoryStore, LedgerWrite, Storage};
use bridge_settlement::types::{Account, AccountStatus, Role, RoleAction, RoleChangeRequest};
use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;

#[path = "helpers.rs"]
mod helpers;
use helpers::{identity, role_contract, MockChain, ADMIN_KEY, DUMMY_FEE};

async fn setup(strategy: ConfirmationStrategy) -> (Arc<MockChain>, Arc<InMemoryStore>, RoleEngine) {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(InMemoryStore::new());
    store.insert_account(Account::new(identity(ADMIN_KEY).address())).await;
    let engine = RoleEngine::new(
        chain.clone(),
        store.clone(),
        Arc::new(FeeOracle::new()),
        role_contract(),
        200_000,
        strategy,
    );
    (chain, store, engine)
}

fn grant(target: Address, role: Role) -> RoleChangeRequest {
    RoleChangeRequest {
        target,
        role,
        action: RoleAction::Grant,
    }
}

/// 1. Test: Poll Convergence
/// Verifies that a grant confirmed on the fourth poll succeeds after exactly four polls.
/// Why: The engine must stop polling as soon as the chain reports the change.
#[tokio::test(start_paused = true)]
async fn test_poll_confirms_after_n_polls_and_persists_once() {
    let (chain, store, engine) = setup(ConfirmationStrategy::Poll).await;
    chain.has_role_after(4, true);
    let target = Address::repeat_byte(0x44);

    let tx_hash = engine
        .change_role(grant(target, Role::Operator), ADMIN_KEY)
        .await
        .unwrap();

    assert_eq!(chain.view_calls(), 4);
    let submissions = chain.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].tx_hash, tx_hash);
    assert_eq!(submissions[0].tx.to, role_contract());
    assert_eq!(&submissions[0].tx.data[..4], &ethers::utils::id("grantRole(bytes32,address)"));
    assert_eq!(&submissions[0].tx.data[4..36], &Role::Operator.role_id());

    assert_eq!(
        store.ledger_writes().await,
        vec![LedgerWrite {
            address: target,
            role: Role::Operator,
            action: RoleAction::Grant
        }]
    );
    assert_eq!(store.get_roles(target).await.unwrap(), vec![Role::Operator]);
}

/// 2. Test: Confirmation Timeout
/// Verifies that a change never observed ends with ConfirmationTimeout after the last poll.
/// Why: Polling must stop once the next wait would exceed one hour.
#[tokio::test(start_paused = true)]
async fn test_poll_times_out_at_ceiling() {
    let (chain, store, engine) = setup(ConfirmationStrategy::Poll).await;
    chain.has_role_always(false);
    let start = tokio::time::Instant::now();

    let result = engine
        .change_role(grant(Address::repeat_byte(0x45), Role::Admin), ADMIN_KEY)
        .await;

    let tx_hash = chain.submissions()[0].tx_hash.clone();
    assert_eq!(result, Err(BridgeError::ConfirmationTimeout { tx_hash }));
    assert_eq!(chain.view_calls(), 8, "waits 1, 3, 9, ... 2187 seconds");
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(3280) && elapsed < Duration::from_secs(3281));
    assert!(store.ledger_writes().await.is_empty());
}

/// 3. Test: Revoke Confirmation
/// Verifies that a revoke is confirmed when membership turns false.
/// Why: Revokes wait for the opposite membership value from grants.
#[tokio::test(start_paused = true)]
async fn test_poll_confirms_revoke() {
    let (chain, store, engine) = setup(ConfirmationStrategy::Poll).await;
    let target = Address::repeat_byte(0x46);
    let mut account = Account::new(target);
    account.roles.insert(Role::Admin);
    store.insert_account(account).await;
    chain.has_role_after(2, false);

    let request = RoleChangeRequest {
        target,
        role: Role::Admin,
        action: RoleAction::Revoke,
    };
    engine.change_role(request, ADMIN_KEY).await.unwrap();

    assert_eq!(chain.view_calls(), 2);
    assert_eq!(&chain.submissions()[0].tx.data[..4], &ethers::utils::id("revokeRole(bytes32,address)"));
    assert!(store.get_roles(target).await.unwrap().is_empty());
}

/// 4. Test: Super Admin Role Identifier
/// Verifies that the super admin role is submitted as the zero identifier.
/// Why: The contract's default admin role is bytes32(0), not a name hash.
#[tokio::test(start_paused = true)]
async fn test_super_admin_uses_zero_role_id() {
    let (chain, _store, engine) = setup(ConfirmationStrategy::EventDelegated).await;
    engine
        .change_role(grant(Address::repeat_byte(0x47), Role::SuperAdmin), ADMIN_KEY)
        .await
        .unwrap();
    assert_eq!(&chain.submissions()[0].tx.data[4..36], &[0u8; 32]);
}

/// 5. Test: Event-Delegated Strategy
/// Verifies that the call returns right after submission without polling.
/// Why: On event-delegated chains the reconciler owns the ledger write.
#[tokio::test(start_paused = true)]
async fn test_event_delegated_returns_without_polling() {
    let (chain, store, engine) = setup(ConfirmationStrategy::EventDelegated).await;
    let start = tokio::time::Instant::now();

    let tx_hash = engine
        .change_role(grant(Address::repeat_byte(0x48), Role::Operator), ADMIN_KEY)
        .await
        .unwrap();

    assert_eq!(tx_hash, chain.submissions()[0].tx_hash);
    assert_eq!(chain.view_calls(), 0);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(store.ledger_writes().await.is_empty());
}

/// 6. Test: Inactive Caller
/// Verifies that suspended or unknown callers are rejected before submission.
/// Why: Only accounts in ok status may change roles.
#[tokio::test(start_paused = true)]
async fn test_inactive_caller_is_rejected() {
    let (chain, store, engine) = setup(ConfirmationStrategy::Poll).await;
    store
        .set_account_status(identity(ADMIN_KEY).address(), AccountStatus::Suspended)
        .await
        .unwrap();

    let result = engine
        .change_role(grant(Address::repeat_byte(0x49), Role::Operator), ADMIN_KEY)
        .await;
    assert!(matches!(result, Err(BridgeError::CallerInactive(_))));

    let unknown = "0x0000000000000000000000000000000000000000000000000000000000000001";
    let result = engine
        .change_role(grant(Address::repeat_byte(0x49), Role::Operator), unknown)
        .await;
    assert!(matches!(result, Err(BridgeError::CallerInactive(_))));
    assert!(chain.submissions().is_empty());
}

/// 7. Test: Invalid Caller Key
/// Verifies that an unparsable key fails with a signing error.
/// Why: Key problems must surface as SigningError, not as a chain failure.
#[tokio::test(start_paused = true)]
async fn test_invalid_caller_key_is_signing_error() {
    let (_chain, _store, engine) = setup(ConfirmationStrategy::Poll).await;
    let result = engine
        .change_role(grant(Address::repeat_byte(0x4a), Role::Operator), "0xnot-a-key")
        .await;
    assert!(matches!(result, Err(BridgeError::Signing(_))));
}

/// 8. Test: Fee Fallback
/// Verifies that a failed fee estimate falls back to the last used fee.
/// Why: Fee estimation failure is not fatal once a fee has worked.
#[tokio::test(start_paused = true)]
async fn test_fee_estimation_falls_back_to_last_used_fee() {
    let (chain, _store, engine) = setup(ConfirmationStrategy::EventDelegated).await;

    engine
        .change_role(grant(Address::repeat_byte(0x4b), Role::Operator), ADMIN_KEY)
        .await
        .unwrap();
    chain.set_fee(DUMMY_FEE * 5);
    chain.fail_fee(true);
    engine
        .change_role(grant(Address::repeat_byte(0x4c), Role::Operator), ADMIN_KEY)
        .await
        .unwrap();

    let submissions = chain.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[1].tx.gas_price, U256::from(DUMMY_FEE));
    assert_eq!(submissions[1].tx.nonce, 1);
}

/// 9. Test: Fee Estimation Without History
/// Verifies that a fee failure with no previous fee surfaces after bounded retries.
/// Why: There is nothing to fall back to, and retries must be capped.
#[tokio::test(start_paused = true)]
async fn test_fee_failure_without_history_fails() {
    let (chain, _store, engine) = setup(ConfirmationStrategy::EventDelegated).await;
    chain.fail_fee(true);

    let result = engine
        .change_role(grant(Address::repeat_byte(0x4d), Role::Operator), ADMIN_KEY)
        .await;
    assert!(matches!(result, Err(BridgeError::Rpc(_))));
    assert!(chain.submissions().is_empty());
}

/// 10. Test: Submission Failure
/// Verifies that a chain that keeps rejecting the transaction yields SubmissionError.
/// Why: Submission retries are bounded and the failure reaches the caller typed.
#[tokio::test(start_paused = true)]
async fn test_submission_failure_is_reported() {
    let (chain, _store, engine) = setup(ConfirmationStrategy::Poll).await;
    chain.fail_submissions(true);

    let result = engine
        .change_role(grant(Address::repeat_byte(0x4e), Role::Operator), ADMIN_KEY)
        .await;
    assert!(matches!(result, Err(BridgeError::Submission(_))));
    assert_eq!(chain.failed_submissions(), 5, "default policy allows five attempts");
    assert_eq!(chain.view_calls(), 0);
}
