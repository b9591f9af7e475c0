//! Governance Roles
//!
//! Drives grant/revoke-role operations to on-chain completion
//! ([`confirmation`]) and folds observed role events back into the role
//! ledger ([`reconciler`]). Both paths converge on [`apply_role_change`], so a
//! change confirmed by polling and later observed as a log is written twice
//! with the same result.

pub mod confirmation;
pub mod reconciler;

pub use confirmation::{PollSchedule, RoleEngine};
pub use reconciler::{decode_role_log, EventReconciler};

use tracing::info;

use crate::error::BridgeResult;
use crate::storage::Storage;
use crate::types::{format_address, RoleAction, RoleChangeRequest};

/// Writes the outcome of a role change to the ledger.
///
/// A grant creates the target account when it is not known yet. A revoke for
/// an unknown account is a no-op.
pub async fn apply_role_change(storage: &dyn Storage, change: &RoleChangeRequest) -> BridgeResult<()> {
    let known = storage.get_account(change.target).await?.is_some();
    match change.action {
        RoleAction::Grant => {
            if !known {
                info!("Creating account {} for role grant", format_address(&change.target));
                storage.create_account(change.target).await?;
            }
            storage.grant_role(change.target, change.role).await
        }
        RoleAction::Revoke => {
            if !known {
                info!(
                    "Ignoring {} revoke for unknown account {}",
                    change.role,
                    format_address(&change.target)
                );
                return Ok(());
            }
            storage.revoke_role(change.target, change.role).await
        }
    }
}
