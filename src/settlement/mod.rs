//! Batch settlement: per-token payout queues and the process that flushes them.

pub mod aggregator;
pub mod queue;

pub use aggregator::{AggregatorHandle, SettlementAggregator, AGGREGATOR_PROCESS};
pub use queue::{AggregatorState, BatchQueue, Payout};
