//! Storage Collaborator
//!
//! The durable store the settlement core reads and writes: accounts and their
//! roles (the role ledger), bridge transfer requests and process checkpoints.
//! Rows are assumed to be written atomically one at a time; nothing here spans
//! multiple rows in one transaction.

mod memory;

pub use memory::{InMemoryStore, LedgerWrite};

use async_trait::async_trait;
use ethers::types::Address;

use crate::error::BridgeResult;
use crate::types::{Account, BridgeTransferRequest, ClaimStatus, Role};

/// Persistence interface used by every orchestration process.
#[async_trait]
pub trait Storage: Send + Sync {
    // ------------------------------------------------------------------------
    // Accounts and role ledger
    // ------------------------------------------------------------------------

    /// Gets, if present, the account for `address`.
    async fn get_account(&self, address: Address) -> BridgeResult<Option<Account>>;

    /// Creates an `ok` account without roles. Returns the existing account if
    /// one is already present.
    async fn create_account(&self, address: Address) -> BridgeResult<Account>;

    /// Roles currently held by `address` (empty for unknown addresses).
    async fn get_roles(&self, address: Address) -> BridgeResult<Vec<Role>>;

    /// Adds `role` to an existing account. Granting a held role is a no-op.
    async fn grant_role(&self, address: Address, role: Role) -> BridgeResult<()>;

    /// Removes `role` from an existing account. Revoking an absent role is a no-op.
    async fn revoke_role(&self, address: Address, role: Role) -> BridgeResult<()>;

    /// Addresses of every account holding `role`.
    async fn role_holders(&self, role: Role) -> BridgeResult<Vec<Address>>;

    // ------------------------------------------------------------------------
    // Bridge transfers
    // ------------------------------------------------------------------------

    /// Inserts or replaces a request, keyed by its internal ID.
    async fn upsert_bridge_transfer(&self, request: &BridgeTransferRequest) -> BridgeResult<()>;

    /// Moves the request's claim status to `to` if it is currently one of
    /// `from`, leaving every other field untouched.
    ///
    /// Returns the status found before the write (whether or not it matched),
    /// or `None` for an unknown request.
    async fn transition_claim_status(
        &self,
        id: &str,
        from: &[ClaimStatus],
        to: ClaimStatus,
    ) -> BridgeResult<Option<ClaimStatus>>;

    /// Records the payout transaction hash of a request. Returns `false` for
    /// an unknown request.
    async fn set_payout_tx_hash(&self, id: &str, tx_hash: &str) -> BridgeResult<bool>;

    async fn get_bridge_transfer(&self, id: &str) -> BridgeResult<Option<BridgeTransferRequest>>;

    async fn get_bridge_transfer_by_deposit(
        &self,
        deposit_tx_hash: &str,
    ) -> BridgeResult<Option<BridgeTransferRequest>>;

    // ------------------------------------------------------------------------
    // Process checkpoints
    // ------------------------------------------------------------------------

    /// Stores the latest checkpoint of the named process, replacing any previous one.
    async fn save_checkpoint(&self, process: &str, state: serde_json::Value) -> BridgeResult<()>;

    async fn load_checkpoint(&self, process: &str) -> BridgeResult<Option<serde_json::Value>>;
}
