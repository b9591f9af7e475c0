//! Batch Settlement Aggregator
//!
//! One long-lived process owns every destination-token queue. Producers send
//! "enqueue payout" signals through an [`AggregatorHandle`]; the process folds
//! them into [`AggregatorState`] and flushes a queue into a single
//! multi-recipient payout when it reaches the batch size, or when the
//! periodic scan finds it older than the maximum batch age.
//!
//! State is checkpointed after every effect and restored on start. After a
//! fixed number of loop iterations the instance ends and a fresh one starts
//! with the same queues.

use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use super::queue::AggregatorState;
use crate::chain::{calldata, send_contract_call, ChainAdapter, FeeOracle};
use crate::config::SettlementConfig;
use crate::crypto::SigningIdentity;
use crate::error::{BridgeError, BridgeResult};
use crate::storage::Storage;
use crate::types::{format_address, BridgeTransferRequest};
use crate::workflow::{execute_activity, Clock, ProcessOutcome, RetryPolicy};

/// Checkpoint key of the aggregator process.
pub const AGGREGATOR_PROCESS: &str = "settlement-aggregator";

/// Sending side of the aggregator's signal channel.
#[derive(Debug, Clone)]
pub struct AggregatorHandle {
    signals: mpsc::Sender<BridgeTransferRequest>,
}

impl AggregatorHandle {
    /// Delivers an "enqueue payout" signal. Waits while the channel is full.
    pub async fn enqueue_payout(&self, request: BridgeTransferRequest) -> BridgeResult<()> {
        self.signals
            .send(request)
            .await
            .map_err(|_| BridgeError::ProcessStopped(AGGREGATOR_PROCESS.to_string()))
    }
}

/// Collaborators of the aggregator process.
pub struct SettlementAggregator {
    chain: Arc<dyn ChainAdapter>,
    storage: Arc<dyn Storage>,
    fees: Arc<FeeOracle>,
    payer: Arc<SigningIdentity>,
    bridge_contract: Address,
    gas_limit: u64,
    config: SettlementConfig,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    signals: mpsc::Receiver<BridgeTransferRequest>,
}

impl SettlementAggregator {
    /// Builds the process and the handle producers use to reach it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<dyn ChainAdapter>,
        storage: Arc<dyn Storage>,
        fees: Arc<FeeOracle>,
        payer: Arc<SigningIdentity>,
        bridge_contract: Address,
        gas_limit: u64,
        config: SettlementConfig,
        clock: Arc<dyn Clock>,
    ) -> (Self, AggregatorHandle) {
        let (tx, rx) = mpsc::channel(config.signal_buffer.max(1));
        let aggregator = Self {
            chain,
            storage,
            fees,
            payer,
            bridge_contract,
            gas_limit,
            config,
            clock,
            policy: RetryPolicy::default(),
            signals: rx,
        };
        (aggregator, AggregatorHandle { signals: tx })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs until every handle is dropped.
    ///
    /// Resumes from the last checkpoint, then runs instances back to back,
    /// each continuation seeded with the previous instance's queues.
    pub async fn run(mut self) -> BridgeResult<()> {
        let mut state = self.restore().await?;
        info!(
            "Starting settlement aggregator: batch_size={}, scan={:?}, max_age={:?}, {} pending request(s)",
            self.config.batch_size,
            self.config.scan_interval(),
            self.config.max_batch_age(),
            state.pending()
        );

        loop {
            match self.run_instance(state).await? {
                ProcessOutcome::Completed => return Ok(()),
                ProcessOutcome::ContinueAsNew(next) => {
                    info!(
                        "Settlement aggregator continuing as new (generation {}, {} pending request(s))",
                        next.generation,
                        next.pending()
                    );
                    self.checkpoint(&next).await;
                    state = next;
                }
            }
        }
    }

    async fn restore(&self) -> BridgeResult<AggregatorState> {
        let blob = execute_activity("load_checkpoint", &self.policy, || {
            self.storage.load_checkpoint(AGGREGATOR_PROCESS)
        })
        .await?;
        match blob {
            None => Ok(AggregatorState::default()),
            Some(blob) => serde_json::from_value(blob)
                .map_err(|e| BridgeError::Storage(format!("corrupt aggregator checkpoint: {}", e))),
        }
    }

    async fn run_instance(&mut self, mut state: AggregatorState) -> BridgeResult<ProcessOutcome<AggregatorState>> {
        let period = self.config.scan_interval();
        let mut scan = interval_at(Instant::now() + period, period);
        scan.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if state.iterations >= self.config.continue_as_new_after {
                return Ok(ProcessOutcome::ContinueAsNew(state.continued()));
            }
            state.iterations += 1;

            // Signals win over the timer when both are ready
            tokio::select! {
                biased;

                signal = self.signals.recv() => match signal {
                    Some(request) => self.on_enqueue(&mut state, request).await,
                    None => {
                        info!("Settlement aggregator signal channel closed, {} request(s) left queued", state.pending());
                        self.checkpoint(&state).await;
                        return Ok(ProcessOutcome::Completed);
                    }
                },
                _ = scan.tick() => self.on_scan(&mut state).await,
            }
        }
    }

    async fn on_enqueue(&self, state: &mut AggregatorState, request: BridgeTransferRequest) {
        let token = request.destination_token_addr;
        info!("Queued request {} for token {}", request.id, format_address(&token));
        let full = state.enqueue(request, self.config.batch_size);
        self.checkpoint(state).await;
        if let Some(token) = full {
            self.flush(state, token).await;
        }
    }

    async fn on_scan(&self, state: &mut AggregatorState) {
        let now = self.clock.now();
        for token in state.due_tokens(now, self.config.max_batch_age()) {
            self.flush(state, token).await;
        }
    }

    /// Pays out one token's queue in a single transaction.
    ///
    /// A failed submission leaves the queue untouched for the next trigger.
    async fn flush(&self, state: &mut AggregatorState, token: Address) {
        let Some(payout) = state.payout_for(&token) else {
            return;
        };
        let count = payout.recipients.len();
        let data = calldata::batch_transfer(payout.token, &payout.recipients, &payout.amounts);

        // A submission with an unknown outcome must not be repeated here; a
        // hung one times out and the queue waits for the next trigger.
        let submit_policy = self.policy.clone().with_maximum_attempts(1);
        let submitted = execute_activity("submit_payout", &submit_policy, || {
            send_contract_call(
                self.chain.as_ref(),
                &self.fees,
                &self.payer,
                self.bridge_contract,
                data.clone(),
                self.gas_limit,
            )
        })
        .await;
        let tx_hash = match submitted {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                error!(
                    "Payout of {} request(s) for token {} failed, keeping them queued: {}",
                    count,
                    format_address(&token),
                    e
                );
                return;
            }
        };

        let settled = state.complete_flush(&token, &tx_hash, self.clock.now());
        self.checkpoint(state).await;
        info!(
            "Flushed {} request(s) for token {} in tx {}",
            settled.len(),
            format_address(&token),
            tx_hash
        );

        // Only the payout hash is written; other fields may have moved on
        // since the request was queued.
        for request in &settled {
            let persisted = execute_activity("set_payout_tx_hash", &self.policy, || async {
                if self.storage.set_payout_tx_hash(&request.id, &tx_hash).await? {
                    Ok(())
                } else {
                    self.storage.upsert_bridge_transfer(request).await
                }
            })
            .await;
            if let Err(e) = persisted {
                error!(
                    "Request {} was paid in tx {} but could not be persisted: {}",
                    request.id, tx_hash, e
                );
            }
        }
    }

    async fn checkpoint(&self, state: &AggregatorState) {
        let blob = match serde_json::to_value(state) {
            Ok(blob) => blob,
            Err(e) => {
                error!("Failed to serialize aggregator checkpoint: {}", e);
                return;
            }
        };
        let saved = execute_activity("save_checkpoint", &self.policy, || {
            self.storage.save_checkpoint(AGGREGATOR_PROCESS, blob.clone())
        })
        .await;
        if let Err(e) = saved {
            warn!("Failed to checkpoint settlement aggregator: {}", e);
        }
    }
}
