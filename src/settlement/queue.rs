//! Batch queue state machine.
//!
//! Pure state: no I/O, no clock reads. The aggregator feeds it signals and
//! timestamps and performs the payouts it asks for, which keeps every
//! decision reproducible from the same inputs.

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::BridgeTransferRequest;

/// Requests awaiting payout for one destination token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchQueue {
    /// Pending requests in arrival order
    pub items: Vec<BridgeTransferRequest>,
    /// Time of the last successful flush; `None` if never flushed
    pub last_flush: Option<DateTime<Utc>>,
}

impl BatchQueue {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Non-empty and last flushed more than `max_age` before `now`.
    pub fn is_due(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        if self.items.is_empty() {
            return false;
        }
        match self.last_flush {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|age| age > max_age)
                .unwrap_or(false),
        }
    }
}

/// One multi-recipient payout call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub token: Address,
    pub recipients: Vec<Address>,
    pub amounts: Vec<U256>,
}

/// Everything the aggregator needs to resume: queues and loop bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorState {
    /// Queues keyed by destination token; iteration order is the scan order
    pub queues: BTreeMap<Address, BatchQueue>,
    /// Main-loop iterations of the current instance
    pub iterations: u64,
    /// Number of continuations so far
    pub generation: u64,
}

impl AggregatorState {
    /// Appends a request to its token's queue, creating the queue if needed.
    ///
    /// Returns the token when the queue has reached `batch_size`.
    pub fn enqueue(&mut self, request: BridgeTransferRequest, batch_size: usize) -> Option<Address> {
        let token = request.destination_token_addr;
        let queue = self.queues.entry(token).or_default();
        queue.items.push(request);
        (queue.len() >= batch_size).then_some(token)
    }

    /// Tokens whose queue should be flushed by the age scan, in key order.
    pub fn due_tokens(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<Address> {
        self.queues
            .iter()
            .filter(|(_, queue)| queue.is_due(now, max_age))
            .map(|(token, _)| *token)
            .collect()
    }

    /// Parallel recipient/amount arrays for the token's queue, in arrival order.
    pub fn payout_for(&self, token: &Address) -> Option<Payout> {
        let queue = self.queues.get(token).filter(|q| !q.is_empty())?;
        Some(Payout {
            token: *token,
            recipients: queue.items.iter().map(|r| r.destination_wallet_addr).collect(),
            amounts: queue.items.iter().map(|r| r.amount).collect(),
        })
    }

    /// Empties the token's queue after a successful payout.
    ///
    /// Returns the drained requests stamped with `tx_hash`.
    pub fn complete_flush(
        &mut self,
        token: &Address,
        tx_hash: &str,
        now: DateTime<Utc>,
    ) -> Vec<BridgeTransferRequest> {
        let Some(queue) = self.queues.get_mut(token) else {
            return Vec::new();
        };
        queue.last_flush = Some(now);
        std::mem::take(&mut queue.items)
            .into_iter()
            .map(|mut request| {
                request.payout_tx_hash = Some(tx_hash.to_string());
                request
            })
            .collect()
    }

    /// Total requests waiting across all queues.
    pub fn pending(&self) -> usize {
        self.queues.values().map(BatchQueue::len).sum()
    }

    /// State for the next instance after a continuation: queues are carried
    /// over, the iteration counter starts again.
    pub fn continued(self) -> Self {
        Self {
            queues: self.queues,
            iterations: 0,
            generation: self.generation + 1,
        }
    }
}
