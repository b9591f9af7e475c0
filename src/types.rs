//! Shared Data Model
//!
//! Bridge transfer requests, claim statuses, roles and the accounts that hold
//! them. These are the only records the settlement core reads or writes
//! through the storage collaborator.

use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::crypto::keccak256;

// ============================================================================
// ADDRESS HELPERS
// ============================================================================

/// Parses a 20-byte EVM address, with or without `0x` prefix.
pub fn parse_address(addr: &str) -> Result<Address> {
    let clean = addr.strip_prefix("0x").unwrap_or(addr);
    let bytes = hex::decode(clean).with_context(|| format!("Invalid address hex: {}", addr))?;
    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes, got {} ({})", bytes.len(), addr);
    }
    Ok(Address::from_slice(&bytes))
}

/// Formats an address as full lowercase `0x`-prefixed hex.
pub fn format_address(addr: &Address) -> String {
    format!("{:#x}", addr)
}

// ============================================================================
// BRIDGE TRANSFERS
// ============================================================================

/// Claim status of a bridge transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Deposit observed but not yet final on the source chain
    Unconfirmed,
    /// A claim credential has been issued and not yet redeemed
    Pending,
    /// The user redeemed the credential on-chain
    Claimed,
    /// The credential expired and its request ID was burned on-chain
    Expired,
    /// Status could not be determined
    Unknown,
}

/// The unit moved through the bridge.
///
/// Created when a deposit is observed on the source chain. Never deleted; only
/// the claim status and payout hash change over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeTransferRequest {
    /// Internal identifier
    pub id: String,
    /// Source-chain deposit transaction hash
    pub deposit_tx_hash: String,
    /// Token address on the source chain
    pub source_token_addr: Address,
    /// Token address on the destination chain (the batch queue key)
    pub destination_token_addr: Address,
    /// Depositor wallet on the source chain
    pub source_wallet_addr: Address,
    /// Recipient wallet on the destination chain
    pub destination_wallet_addr: Address,
    /// Amount in destination token units
    pub amount: U256,
    /// Globally unique request ID, used on-chain as a replay-prevention nonce
    pub request_id: U256,
    /// Current claim status
    pub claim_status: ClaimStatus,
    /// Destination-chain payout transaction hash once settled
    pub payout_tx_hash: Option<String>,
}

impl BridgeTransferRequest {
    /// A request for a deposit just observed on the source chain.
    #[allow(clippy::too_many_arguments)]
    pub fn new_deposit(
        deposit_tx_hash: impl Into<String>,
        source_token_addr: Address,
        destination_token_addr: Address,
        source_wallet_addr: Address,
        destination_wallet_addr: Address,
        amount: U256,
        request_id: U256,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            deposit_tx_hash: deposit_tx_hash.into(),
            source_token_addr,
            destination_token_addr,
            source_wallet_addr,
            destination_wallet_addr,
            amount,
            request_id,
            claim_status: ClaimStatus::Unconfirmed,
            payout_tx_hash: None,
        }
    }
}

// ============================================================================
// ROLES
// ============================================================================

/// Governance roles known to the bridge contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Distinguished role whose on-chain identifier is all zeros
    SuperAdmin,
    Admin,
    Operator,
    Authenticator,
}

impl Role {
    /// Every role, in lookup order.
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::Operator, Role::Authenticator];

    /// Role name as stored off-chain and hashed on-chain.
    pub fn name(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Operator => "operator",
            Role::Authenticator => "authenticator",
        }
    }

    /// 32-byte on-chain role identifier.
    ///
    /// All zeros for the super admin role, `keccak256(name)` otherwise.
    pub fn role_id(&self) -> [u8; 32] {
        match self {
            Role::SuperAdmin => [0u8; 32],
            other => keccak256(other.name().as_bytes()),
        }
    }

    /// Reverse lookup from an on-chain role identifier.
    pub fn from_role_id(role_id: &[u8; 32]) -> Option<Role> {
        Role::ALL.iter().copied().find(|role| role.role_id() == *role_id)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of a role change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleAction {
    Grant,
    Revoke,
}

impl RoleAction {
    /// Solidity signature of the contract method performing this action.
    pub fn method_signature(&self) -> &'static str {
        match self {
            RoleAction::Grant => "grantRole(bytes32,address)",
            RoleAction::Revoke => "revokeRole(bytes32,address)",
        }
    }

    /// Role membership the chain reports once this action has landed.
    pub fn expected_membership(&self) -> bool {
        matches!(self, RoleAction::Grant)
    }
}

/// A requested role change. Lives only for one confirmation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChangeRequest {
    pub target: Address,
    pub role: Role,
    pub action: RoleAction,
}

// ============================================================================
// ACCOUNTS
// ============================================================================

/// Account status as tracked by the user subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Ok,
    Suspended,
}

/// An address known to the role ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub status: AccountStatus,
    pub roles: BTreeSet<Role>,
}

impl Account {
    /// A freshly discovered account with no roles.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            status: AccountStatus::Ok,
            roles: BTreeSet::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_admin_role_id_is_zero() {
        assert_eq!(Role::SuperAdmin.role_id(), [0u8; 32]);
        assert_ne!(Role::Admin.role_id(), [0u8; 32]);
    }

    #[test]
    fn test_role_id_lookup_round_trips() {
        for role in Role::ALL {
            assert_eq!(Role::from_role_id(&role.role_id()), Some(role));
        }
        assert_eq!(Role::from_role_id(&[0xab; 32]), None);
    }

    #[test]
    fn test_new_deposit_starts_unconfirmed() {
        let request = BridgeTransferRequest::new_deposit(
            "0xabc",
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            Address::repeat_byte(3),
            Address::repeat_byte(4),
            U256::from(5u64),
            U256::from(6u64),
        );
        assert_eq!(request.claim_status, ClaimStatus::Unconfirmed);
        assert!(request.payout_tx_hash.is_none());
        assert!(Uuid::parse_str(&request.id).is_ok());
    }

    #[test]
    fn test_parse_address_accepts_prefix() {
        let a = parse_address("0x00000000000000000000000000000000000000aa").unwrap();
        let b = parse_address("00000000000000000000000000000000000000aa").unwrap();
        assert_eq!(a, b);
        assert_eq!(format_address(&a), "0x00000000000000000000000000000000000000aa");
        assert!(parse_address("0x1234").is_err());
    }
}
