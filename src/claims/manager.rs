//! Claim Lifecycle Manager
//!
//! Issues claim credentials for observed deposits and invalidates the ones
//! that are not redeemed in time. The service never submits a claim itself;
//! the user does, with the returned credential.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::authenticator::AuthenticatorSlot;
use crate::chain::{calldata, send_contract_call, ChainAdapter, FeeOracle};
use crate::config::ClaimsConfig;
use crate::crypto::SigningIdentity;
use crate::error::{BridgeError, BridgeResult};
use crate::lookup::DepositLookup;
use crate::notify::Notifier;
use crate::storage::Storage;
use crate::types::{format_address, BridgeTransferRequest, ClaimStatus, Role};
use crate::workflow::{execute_activity, spawn_process, RetryPolicy};

/// Expiry checks made for one request before it is left `Pending` for an
/// operator to resolve. Only a missing authenticator causes a re-check.
pub const EXPIRY_MAX_CHECKS: u32 = 5;

/// What a user needs to redeem a deposit on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimCredential {
    pub token_addr: Address,
    pub amount: U256,
    pub request_id: U256,
    /// 65-byte `r || s || v` signature
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}

/// Result of an expiry check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// The request left `Pending` before the check; nothing was done
    NoAction(ClaimStatus),
    /// The request ID was burned on-chain and the request marked expired
    Invalidated { tx_hash: String },
}

pub struct ClaimManager {
    lookup: Arc<dyn DepositLookup>,
    storage: Arc<dyn Storage>,
    slot: Arc<AuthenticatorSlot>,
    notifier: Arc<dyn Notifier>,
    chain: Arc<dyn ChainAdapter>,
    fees: Arc<FeeOracle>,
    payer: Arc<SigningIdentity>,
    bridge_contract: Address,
    gas_limit: u64,
    config: ClaimsConfig,
    policy: RetryPolicy,
}

impl ClaimManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lookup: Arc<dyn DepositLookup>,
        storage: Arc<dyn Storage>,
        slot: Arc<AuthenticatorSlot>,
        notifier: Arc<dyn Notifier>,
        chain: Arc<dyn ChainAdapter>,
        fees: Arc<FeeOracle>,
        payer: Arc<SigningIdentity>,
        bridge_contract: Address,
        gas_limit: u64,
        config: ClaimsConfig,
    ) -> Self {
        Self {
            lookup,
            storage,
            slot,
            notifier,
            chain,
            fees,
            payer,
            bridge_contract,
            gas_limit,
            config,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Issues a claim credential for a deposit and schedules its expiry check.
    ///
    /// # Arguments
    ///
    /// * `deposit_tx_hash` - Source-chain deposit transaction
    /// * `user` - Destination wallet requesting the claim
    /// * `contract_version` - Version tag of the bridge contract
    ///
    /// # Returns
    ///
    /// * `Ok(ClaimCredential)` - Token, amount, request ID and signature
    /// * `Err(BridgeError::AuthenticatorUnavailable)` - No key loaded; operators are notified
    /// * `Err(BridgeError::LookupFailed)` - The deposit could not be resolved in time
    /// * `Err(BridgeError::InvalidClaim)` - Wrong wallet, or already claimed/expired
    /// * `Err(BridgeError::SigningFailed)` - The payload could not be signed
    pub async fn prepare_claim(
        self: &Arc<Self>,
        deposit_tx_hash: &str,
        user: Address,
        contract_version: &str,
    ) -> BridgeResult<ClaimCredential> {
        let mut request = match tokio::time::timeout(
            self.config.lookup_timeout(),
            self.lookup.get_deposit_by_tx_hash(deposit_tx_hash),
        )
        .await
        {
            Ok(Ok(request)) => request,
            Ok(Err(BridgeError::LookupFailed(reason))) => return Err(BridgeError::LookupFailed(reason)),
            Ok(Err(e)) => return Err(BridgeError::LookupFailed(e.to_string())),
            Err(_) => {
                return Err(BridgeError::LookupFailed(format!(
                    "lookup of {} timed out after {:?}",
                    deposit_tx_hash,
                    self.config.lookup_timeout()
                )))
            }
        };

        let Some(authenticator) = self.slot.current().await else {
            warn!("Claim for deposit {} refused: no authenticator key loaded", deposit_tx_hash);
            self.notify_operators_unavailable(format!("A claim for deposit {} was refused", deposit_tx_hash));
            return Err(BridgeError::AuthenticatorUnavailable);
        };

        validate_claim(&request, user)?;

        let signature = authenticator
            .sign_claim(
                &request.destination_token_addr,
                &user,
                &request.amount,
                &request.request_id,
                contract_version,
            )
            .map_err(|e| BridgeError::SigningFailed(format!("{:#}", e)))?;

        // Only the status moves; a concurrent payout may already have
        // stamped the stored row.
        let previous = execute_activity("transition_claim_status", &self.policy, || {
            self.storage.transition_claim_status(
                &request.id,
                &[ClaimStatus::Unconfirmed, ClaimStatus::Pending, ClaimStatus::Unknown],
                ClaimStatus::Pending,
            )
        })
        .await?;
        match previous {
            None => {
                request.claim_status = ClaimStatus::Pending;
                execute_activity("upsert_bridge_transfer", &self.policy, || {
                    self.storage.upsert_bridge_transfer(&request)
                })
                .await?;
            }
            Some(status @ (ClaimStatus::Claimed | ClaimStatus::Expired)) => {
                return Err(BridgeError::InvalidClaim(format!(
                    "request {} is already {:?}",
                    request.id, status
                )));
            }
            Some(_) => {}
        }

        info!(
            "Issued claim credential for request {} (deposit {}) to {}",
            request.id,
            deposit_tx_hash,
            format_address(&user)
        );
        self.schedule_expiry(request.id.clone(), contract_version.to_string());

        Ok(ClaimCredential {
            token_addr: request.destination_token_addr,
            amount: request.amount,
            request_id: request.request_id,
            signature,
        })
    }

    /// Starts the expiry watcher for one request.
    ///
    /// Checks once the expiry delay has passed. While no authenticator is
    /// loaded the check is repeated every expiry delay, up to
    /// [`EXPIRY_MAX_CHECKS`] checks in total.
    pub fn schedule_expiry(
        self: &Arc<Self>,
        request_id: String,
        contract_version: String,
    ) -> JoinHandle<BridgeResult<ExpiryOutcome>> {
        let manager = Arc::clone(self);
        spawn_process(format!("claim_expiry {}", request_id), async move {
            let mut check = 1;
            loop {
                tokio::time::sleep(manager.config.expiry_delay()).await;
                match manager.expire_if_pending(&request_id, &contract_version).await {
                    Err(BridgeError::AuthenticatorUnavailable) if check < EXPIRY_MAX_CHECKS => {
                        warn!(
                            "Expiry check {}/{} for request {} found no authenticator, checking again in {:?}",
                            check,
                            EXPIRY_MAX_CHECKS,
                            request_id,
                            manager.config.expiry_delay()
                        );
                        check += 1;
                    }
                    Err(BridgeError::AuthenticatorUnavailable) => {
                        error!(
                            "Request {} is stuck Pending with a live claim signature after {} expiry checks",
                            request_id, EXPIRY_MAX_CHECKS
                        );
                        return Err(BridgeError::AuthenticatorUnavailable);
                    }
                    outcome => return outcome,
                }
            }
        })
    }

    /// Burns the request ID on-chain and marks the request expired, if it is
    /// still `Pending`.
    pub async fn expire_if_pending(&self, request_id: &str, contract_version: &str) -> BridgeResult<ExpiryOutcome> {
        let request = execute_activity("get_bridge_transfer", &self.policy, || {
            self.storage.get_bridge_transfer(request_id)
        })
        .await?
        .ok_or_else(|| BridgeError::Storage(format!("request {} disappeared", request_id)))?;

        if request.claim_status != ClaimStatus::Pending {
            info!(
                "Claim for request {} is {:?}, no invalidation needed",
                request.id, request.claim_status
            );
            return Ok(ExpiryOutcome::NoAction(request.claim_status));
        }

        let Some(authenticator) = self.slot.current().await else {
            warn!("Cannot invalidate expired claim for request {}: no authenticator key loaded", request.id);
            self.notify_operators_unavailable(format!(
                "The expired claim for request {} could not be invalidated",
                request.id
            ));
            return Err(BridgeError::AuthenticatorUnavailable);
        };
        let signature = authenticator
            .sign_claim(
                &request.destination_token_addr,
                &request.destination_wallet_addr,
                &U256::zero(),
                &request.request_id,
                contract_version,
            )
            .map_err(|e| BridgeError::SigningFailed(format!("{:#}", e)))?;

        let data = calldata::invalidate_request(
            request.destination_token_addr,
            request.destination_wallet_addr,
            U256::zero(),
            request.request_id,
            signature,
        );
        let tx_hash = execute_activity("invalidate_request", &self.policy, || {
            send_contract_call(
                self.chain.as_ref(),
                &self.fees,
                &self.payer,
                self.bridge_contract,
                data.clone(),
                self.gas_limit,
            )
        })
        .await?;

        let previous = execute_activity("transition_claim_status", &self.policy, || {
            self.storage
                .transition_claim_status(&request.id, &[ClaimStatus::Pending], ClaimStatus::Expired)
        })
        .await?;
        if previous != Some(ClaimStatus::Pending) {
            warn!(
                "Request {} moved to {:?} while its invalidation was in flight",
                request.id, previous
            );
        }

        warn!("Claim for request {} expired, request ID burned in tx {}", request.id, tx_hash);
        Ok(ExpiryOutcome::Invalidated { tx_hash })
    }

    fn notify_operators_unavailable(&self, what: String) {
        let notifier = Arc::clone(&self.notifier);
        let body = format!(
            "{} because no authenticator key is loaded. \
             Set the current authenticator to resume claims.",
            what
        );
        tokio::spawn(async move {
            if let Err(e) = notifier
                .notify_role(Role::Operator, "Authenticator unavailable", &body)
                .await
            {
                warn!("Failed to notify operators: {:#}", e);
            }
        });
    }
}

/// Checks that `user` may claim `request`.
fn validate_claim(request: &BridgeTransferRequest, user: Address) -> BridgeResult<()> {
    if request.destination_wallet_addr != user {
        return Err(BridgeError::InvalidClaim(format!(
            "deposit {} belongs to {}, not {}",
            request.deposit_tx_hash,
            format_address(&request.destination_wallet_addr),
            format_address(&user)
        )));
    }
    match request.claim_status {
        ClaimStatus::Claimed | ClaimStatus::Expired => Err(BridgeError::InvalidClaim(format!(
            "request {} is already {:?}",
            request.id, request.claim_status
        ))),
        _ => Ok(()),
    }
}
