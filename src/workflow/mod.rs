//! Durable Execution Substrate
//!
//! Long-lived orchestration processes (the settlement aggregator, role
//! confirmation runs, reconciler dispatches and claim-expiry watchers) are
//! built from the pieces in this module:
//!
//! - [`execute_activity`] runs one externally-visible step with a per-attempt
//!   timeout and a capped exponential backoff ([`RetryPolicy`])
//! - [`Clock`] is the only source of wall-clock time inside process logic, so
//!   decisions can be replayed against the same timeline
//! - [`spawn_process`] starts an independent cooperative process and logs its
//!   outcome
//! - [`ProcessOutcome`] lets a process restart itself with fresh history while
//!   carrying its state forward
//!
//! Process state that must survive a crash is checkpointed through the
//! storage collaborator (`Storage::save_checkpoint`).

mod clock;
mod retry;

pub use clock::{Clock, TokioClock};
pub use retry::{execute_activity, RetryPolicy};

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::BridgeResult;

/// How a process instance ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome<S> {
    /// The process finished its work
    Completed,
    /// The process asked to be restarted as a fresh instance seeded with `S`
    ContinueAsNew(S),
}

/// Starts `process` as an independent task, logging how it ended.
///
/// The handle yields the process result so callers that care (tests, the
/// service entry point) can await it; fire-and-forget callers drop it.
pub fn spawn_process<T, F>(name: impl Into<String>, process: F) -> JoinHandle<BridgeResult<T>>
where
    T: Send + 'static,
    F: Future<Output = BridgeResult<T>> + Send + 'static,
{
    let name = name.into();
    tokio::spawn(async move {
        let result = process.await;
        match &result {
            Ok(_) => info!("Process '{}' completed", name),
            Err(e) => error!("Process '{}' failed: {}", name, e),
        }
        result
    })
}
