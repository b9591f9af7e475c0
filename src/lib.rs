//! Bridge Settlement Service Library
//!
//! Cross-chain settlement orchestration for a custodial two-chain bridge:
//! batched multi-recipient payouts, governance role changes driven to
//! confirmation, reconciliation of on-chain role events into the role ledger,
//! and the lifecycle of signed claim credentials.

pub mod chain;
pub mod claims;
pub mod config;
pub mod crypto;
pub mod error;
pub mod lookup;
pub mod notify;
pub mod roles;
pub mod settlement;
pub mod storage;
pub mod types;
pub mod workflow;

// Re-export commonly used types
pub use chain::{ChainAdapter, EvmClient, FeeOracle};
pub use claims::{AuthenticatorSlot, ClaimCredential, ClaimManager};
pub use config::{Config, ConfirmationStrategy, EvmChainConfig};
pub use crypto::SigningIdentity;
pub use error::{BridgeError, BridgeResult};
pub use roles::{EventReconciler, RoleEngine};
pub use settlement::{AggregatorHandle, SettlementAggregator};
pub use storage::{InMemoryStore, Storage};
pub use types::{Account, AccountStatus, BridgeTransferRequest, ClaimStatus, Role, RoleAction, RoleChangeRequest};
