//! Role Confirmation Engine
//!
//! Submits `grantRole`/`revokeRole` on the access-control contract and
//! confirms the change with the chain's configured strategy:
//!
//! - **Poll**: read `hasRole` after waits of 1s, 3s, 9s, ... until the chain
//!   reports the expected membership or the next wait would exceed one hour,
//!   then write the ledger.
//! - **Event-delegated**: return the transaction hash right after
//!   submission. The event reconciler writes the ledger when the log shows up.

use ethers::types::Address;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::chain::{calldata, send_contract_call, ChainAdapter, FeeOracle};
use crate::config::ConfirmationStrategy;
use crate::crypto::SigningIdentity;
use crate::error::{BridgeError, BridgeResult};
use crate::roles::apply_role_change;
use crate::storage::Storage;
use crate::types::{format_address, Role, RoleChangeRequest};
use crate::workflow::{execute_activity, RetryPolicy};

// ============================================================================
// POLL SCHEDULE
// ============================================================================

/// Geometric wait schedule for the poll strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    /// Wait before the first membership check
    pub initial_wait: Duration,
    /// Multiplier applied after each failed check
    pub factor: u32,
    /// Polling stops once the next wait would exceed this
    pub ceiling: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_secs(1),
            factor: 3,
            ceiling: Duration::from_secs(3600),
        }
    }
}

impl PollSchedule {
    /// The waits preceding each membership check, in order.
    pub fn waits(&self) -> impl Iterator<Item = Duration> {
        let factor = self.factor.max(2);
        let ceiling = self.ceiling;
        std::iter::successors(Some(self.initial_wait), move |wait| wait.checked_mul(factor))
            .take_while(move |wait| *wait <= ceiling)
    }
}

// ============================================================================
// ROLE ENGINE
// ============================================================================

/// Drives role changes on one chain to confirmed completion.
pub struct RoleEngine {
    chain: Arc<dyn ChainAdapter>,
    storage: Arc<dyn Storage>,
    fees: Arc<FeeOracle>,
    role_contract: Address,
    gas_limit: u64,
    strategy: ConfirmationStrategy,
    schedule: PollSchedule,
    policy: RetryPolicy,
}

impl RoleEngine {
    pub fn new(
        chain: Arc<dyn ChainAdapter>,
        storage: Arc<dyn Storage>,
        fees: Arc<FeeOracle>,
        role_contract: Address,
        gas_limit: u64,
        strategy: ConfirmationStrategy,
    ) -> Self {
        Self {
            chain,
            storage,
            fees,
            role_contract,
            gas_limit,
            strategy,
            schedule: PollSchedule::default(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_schedule(mut self, schedule: PollSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn strategy(&self) -> ConfirmationStrategy {
        self.strategy
    }

    /// Grants or revokes a role on-chain on behalf of `caller_key`.
    ///
    /// # Arguments
    ///
    /// * `request` - Target address, role and action
    /// * `caller_key` - Hex private key of the admin submitting the change
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - Hash of the submitted transaction
    /// * `Err(BridgeError::ConfirmationTimeout)` - Submitted but never observed (poll strategy)
    /// * `Err(BridgeError)` - Caller inactive, signing or submission failure
    pub async fn change_role(&self, request: RoleChangeRequest, caller_key: &str) -> BridgeResult<String> {
        let caller = SigningIdentity::from_hex(caller_key)
            .map_err(|e| BridgeError::Signing(format!("{:#}", e)))?;
        let caller_addr = caller.address();

        let account = execute_activity("get_caller_account", &self.policy, || {
            self.storage.get_account(caller_addr)
        })
        .await?;
        if !account.map(|a| a.is_active()).unwrap_or(false) {
            return Err(BridgeError::CallerInactive(format_address(&caller_addr)));
        }

        let data = calldata::role_change(request.action, request.role, request.target);

        let tx_hash = execute_activity("submit_role_change", &self.policy, || {
            send_contract_call(
                self.chain.as_ref(),
                &self.fees,
                &caller,
                self.role_contract,
                data.clone(),
                self.gas_limit,
            )
        })
        .await?;

        info!(
            "Submitted {:?} of role {} for {}: tx {}",
            request.action,
            request.role,
            format_address(&request.target),
            tx_hash
        );

        match self.strategy {
            ConfirmationStrategy::EventDelegated => Ok(tx_hash),
            ConfirmationStrategy::Poll => {
                self.poll_until_confirmed(&request, &tx_hash).await?;
                Ok(tx_hash)
            }
        }
    }

    async fn poll_until_confirmed(&self, request: &RoleChangeRequest, tx_hash: &str) -> BridgeResult<()> {
        let expected = request.action.expected_membership();

        for (poll, wait) in self.schedule.waits().enumerate() {
            tokio::time::sleep(wait).await;
            match self.has_role(request.role, request.target).await {
                Ok(member) if member == expected => {
                    info!("Role change {} confirmed after {} poll(s)", tx_hash, poll + 1);
                    return execute_activity("persist_role_change", &self.policy, || {
                        apply_role_change(self.storage.as_ref(), request)
                    })
                    .await;
                }
                Ok(_) => {}
                Err(e) => warn!("Membership check {} for {} failed: {}", poll + 1, tx_hash, e),
            }
        }

        error!(
            "Role change {} ({:?} {} for {}) not confirmed within the polling ceiling",
            tx_hash,
            request.action,
            request.role,
            format_address(&request.target)
        );
        Err(BridgeError::ConfirmationTimeout {
            tx_hash: tx_hash.to_string(),
        })
    }

    async fn has_role(&self, role: Role, target: Address) -> BridgeResult<bool> {
        let data = calldata::has_role(role, target);
        let result = execute_activity("has_role", &self.policy, || {
            self.chain.call_view(self.role_contract, data.clone())
        })
        .await?;
        calldata::decode_bool(&result).map_err(|e| BridgeError::Rpc(format!("{:#}", e)))
    }
}
