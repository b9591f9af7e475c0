//! Event Reconciler
//!
//! Polls the access-control contract for `RoleGranted`/`RoleRevoked` logs and
//! applies each one to the role ledger through a save-role or remove-role
//! step. Logs whose role hash is not in the lookup table, or whose shape is
//! wrong, are logged and dropped without retry.
//!
//! The logs of one scan are applied in chain order by a single process, and
//! each scan's process waits for the previous one, so a grant and a later
//! revoke of the same role can never land in the ledger out of order.

use ethers::types::{Address, Log, H256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chain::ChainAdapter;
use crate::crypto::keccak256;
use crate::error::{BridgeError, BridgeResult};
use crate::roles::apply_role_change;
use crate::storage::Storage;
use crate::types::{format_address, Role, RoleAction, RoleChangeRequest};
use crate::workflow::{execute_activity, spawn_process, RetryPolicy};

/// Attempts allowed for one save-role / remove-role step.
pub const ROLE_SYNC_MAX_ATTEMPTS: u32 = 20;

/// `keccak256("RoleGranted(bytes32,address,address)")`
pub fn role_granted_topic() -> H256 {
    H256::from(keccak256(b"RoleGranted(bytes32,address,address)"))
}

/// `keccak256("RoleRevoked(bytes32,address,address)")`
pub fn role_revoked_topic() -> H256 {
    H256::from(keccak256(b"RoleRevoked(bytes32,address,address)"))
}

fn tx_ref(log: &Log) -> String {
    log.transaction_hash
        .map(|hash| format!("{:#x}", hash))
        .unwrap_or_else(|| "<pending>".to_string())
}

/// Decodes a role event into the change it announces.
///
/// Topics: `[event signature, role, account, sender]`.
pub fn decode_role_log(log: &Log) -> BridgeResult<RoleChangeRequest> {
    if log.topics.len() < 3 {
        return Err(BridgeError::MalformedLog(format!(
            "expected at least 3 topics in tx {}, got {}",
            tx_ref(log),
            log.topics.len()
        )));
    }

    let signature = log.topics[0];
    let action = if signature == role_granted_topic() {
        RoleAction::Grant
    } else if signature == role_revoked_topic() {
        RoleAction::Revoke
    } else {
        return Err(BridgeError::MalformedLog(format!(
            "unexpected event signature {:#x}",
            signature
        )));
    };

    let role = Role::from_role_id(log.topics[1].as_fixed_bytes())
        .ok_or_else(|| BridgeError::UnknownRole(format!("{:#x}", log.topics[1])))?;

    // Indexed addresses are left-padded to 32 bytes
    let account = log.topics[2];
    if account.as_bytes()[..12].iter().any(|b| *b != 0) {
        return Err(BridgeError::MalformedLog(format!(
            "account topic {:#x} is not a padded address",
            account
        )));
    }
    let target = Address::from(account);

    Ok(RoleChangeRequest { target, role, action })
}

/// Chain position of a log, for ordering one scan's results.
fn log_position(log: &Log) -> (u64, u64) {
    (
        log.block_number.map(|b| b.as_u64()).unwrap_or_default(),
        log.log_index.map(|i| i.low_u64()).unwrap_or_default(),
    )
}

/// Converges the role ledger with role events observed on one contract.
pub struct EventReconciler {
    chain: Arc<dyn ChainAdapter>,
    storage: Arc<dyn Storage>,
    contract: Address,
    poll_interval: Duration,
    policy: RetryPolicy,
    /// First block not yet scanned
    next_block: Option<u64>,
    /// Completion signal of the most recently dispatched scan
    previous_batch: Option<oneshot::Receiver<()>>,
}

impl EventReconciler {
    pub fn new(
        chain: Arc<dyn ChainAdapter>,
        storage: Arc<dyn Storage>,
        contract: Address,
        poll_interval: Duration,
    ) -> Self {
        Self {
            chain,
            storage,
            contract,
            poll_interval,
            policy: RetryPolicy::default().with_maximum_attempts(ROLE_SYNC_MAX_ATTEMPTS),
            next_block: None,
            previous_batch: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Starts scanning at `block` instead of the chain head.
    pub fn starting_at(mut self, block: u64) -> Self {
        self.next_block = Some(block);
        self
    }

    /// Decodes one scan's logs and starts the process that applies them.
    ///
    /// Logs are applied one at a time in `(block, log index)` order, after
    /// the previous scan's process has finished. A step that keeps failing is
    /// logged and the rest of the scan still runs; the process reports the
    /// first failure. Returns `None` when every log was dropped.
    pub fn dispatch(&mut self, mut logs: Vec<Log>) -> Option<JoinHandle<BridgeResult<()>>> {
        logs.sort_by_key(log_position);

        let mut changes = Vec::with_capacity(logs.len());
        for log in &logs {
            match decode_role_log(log) {
                Ok(change) => {
                    info!(
                        "Observed {} {} for {} in tx {}",
                        step_name(change.action),
                        change.role,
                        format_address(&change.target),
                        tx_ref(log)
                    );
                    changes.push(change);
                }
                Err(e) => warn!("Dropping role log from tx {}: {}", tx_ref(log), e),
            }
        }
        if changes.is_empty() {
            return None;
        }

        let previous = self.previous_batch.take();
        let (done_tx, done_rx) = oneshot::channel();
        self.previous_batch = Some(done_rx);

        let storage = self.storage.clone();
        let policy = self.policy.clone();
        let name = format!("role_sync {} change(s)", changes.len());
        Some(spawn_process(name, async move {
            if let Some(previous) = previous {
                // A dropped sender means the previous process ended anyway
                let _ = previous.await;
            }

            let mut first_error = None;
            for change in &changes {
                let step = step_name(change.action);
                let applied =
                    execute_activity(step, &policy, || apply_role_change(storage.as_ref(), change)).await;
                if let Err(e) = applied {
                    error!(
                        "Giving up on {} {} for {}: {}",
                        step,
                        change.role,
                        format_address(&change.target),
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }

            let _ = done_tx.send(());
            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }))
    }

    /// Fetches logs from the next unscanned block up to the head and
    /// dispatches them.
    pub async fn poll_once(&mut self) -> BridgeResult<Option<JoinHandle<BridgeResult<()>>>> {
        let head = self.chain.block_number().await?;
        let from = match self.next_block {
            Some(block) => block,
            None => head,
        };
        if from > head {
            return Ok(None);
        }

        let topics = [role_granted_topic(), role_revoked_topic()];
        let logs = self.chain.get_logs(self.contract, &topics, from, head).await?;
        debug!("Scanned blocks {}..={}: {} role log(s)", from, head, logs.len());

        let handle = self.dispatch(logs);
        self.next_block = Some(head + 1);
        Ok(handle)
    }

    /// Polls forever. Scan failures are logged and retried on the next tick.
    pub async fn run(mut self) -> BridgeResult<()> {
        info!(
            "Starting role event reconciler for {} (interval {:?})",
            format_address(&self.contract),
            self.poll_interval
        );
        loop {
            if let Err(e) = self.poll_once().await {
                error!("Error polling role events: {}", e);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn step_name(action: RoleAction) -> &'static str {
    match action {
        RoleAction::Grant => "save_role",
        RoleAction::Revoke => "remove_role",
    }
}
