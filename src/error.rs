//! Error Types Module
//!
//! Typed failures surfaced by the settlement core. Callers of the role engine
//! and the claim manager match on these; the workflow substrate uses
//! [`BridgeError::is_retryable`] to decide whether a failed step is retried.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Every failure the settlement core can report to its callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The caller's account is unknown or not in `ok` status
    #[error("caller {0} is not an active account")]
    CallerInactive(String),

    /// A transaction could not be built or signed
    #[error("signing error: {0}")]
    Signing(String),

    /// The chain rejected or never received a transaction
    #[error("submission error: {0}")]
    Submission(String),

    /// A role change was submitted but never observed on-chain
    #[error("role change transaction {tx_hash} was not confirmed within the polling ceiling")]
    ConfirmationTimeout { tx_hash: String },

    /// No authenticator key is loaded in the slot
    #[error("no authenticator key is currently loaded")]
    AuthenticatorUnavailable,

    /// The paired-chain deposit could not be resolved
    #[error("deposit lookup failed: {0}")]
    LookupFailed(String),

    /// The claim payload could not be signed
    #[error("failed to sign claim payload: {0}")]
    SigningFailed(String),

    /// A role log carried a role hash missing from the lookup table
    #[error("unknown role hash {0}")]
    UnknownRole(String),

    /// A log did not have the expected shape
    #[error("malformed log: {0}")]
    MalformedLog(String),

    /// An authenticator hot-swap was refused; the previous key stays active
    #[error("authenticator swap rejected: {0}")]
    AuthenticatorRejected(String),

    /// The deposit is not eligible for a claim credential
    #[error("invalid claim: {0}")]
    InvalidClaim(String),

    /// The storage collaborator failed
    #[error("storage error: {0}")]
    Storage(String),

    /// A chain JSON-RPC call failed
    #[error("rpc error: {0}")]
    Rpc(String),

    /// A single attempt of a workflow step exceeded its timeout
    #[error("step '{0}' timed out")]
    ActivityTimeout(String),

    /// A long-lived process no longer accepts signals
    #[error("process '{0}' is not running")]
    ProcessStopped(String),
}

impl BridgeError {
    /// Whether retrying the failed step can plausibly succeed.
    ///
    /// Transient infrastructure failures (RPC, storage, timeouts, submission
    /// races) are retryable. Malformed input and policy rejections are not:
    /// running the same step again yields the same answer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Submission(_)
                | BridgeError::Storage(_)
                | BridgeError::Rpc(_)
                | BridgeError::ActivityTimeout(_)
                | BridgeError::LookupFailed(_)
        )
    }
}

impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        BridgeError::Rpc(format!("{:#}", err))
    }
}
