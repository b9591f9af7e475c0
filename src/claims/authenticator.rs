//! Authenticator key slot.
//!
//! Holds the signing identity that issues claim credentials. Readers take the
//! shared lock only long enough to clone the `Arc`; a hot-swap takes the
//! exclusive lock only after every check has passed, so a rejected swap never
//! disturbs the current key.

use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::crypto::SigningIdentity;
use crate::error::{BridgeError, BridgeResult};
use crate::storage::Storage;
use crate::types::{format_address, Role};

pub struct AuthenticatorSlot {
    current: RwLock<Option<Arc<SigningIdentity>>>,
    storage: Arc<dyn Storage>,
}

impl AuthenticatorSlot {
    /// An empty slot: claims fail with `AuthenticatorUnavailable` until a key is set.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            current: RwLock::new(None),
            storage,
        }
    }

    /// The active identity, if any.
    pub async fn current(&self) -> Option<Arc<SigningIdentity>> {
        self.current.read().await.clone()
    }

    /// Address of the active identity, if any.
    pub async fn current_address(&self) -> Option<Address> {
        self.current.read().await.as_ref().map(|identity| identity.address())
    }

    /// Replaces the active identity.
    ///
    /// The key must derive `claimed_address`, and that address must be an
    /// `ok` account holding the authenticator role. Otherwise the swap is
    /// rejected and the previous identity stays active.
    pub async fn set_current(&self, claimed_address: Address, private_key: &str) -> BridgeResult<()> {
        let identity = SigningIdentity::from_hex(private_key)
            .map_err(|e| BridgeError::AuthenticatorRejected(format!("{:#}", e)))?;

        if identity.address() != claimed_address {
            warn!(
                "Rejected authenticator swap: key derives {}, claimed {}",
                format_address(&identity.address()),
                format_address(&claimed_address)
            );
            return Err(BridgeError::AuthenticatorRejected(format!(
                "key does not derive {}",
                format_address(&claimed_address)
            )));
        }

        let account = self.storage.get_account(claimed_address).await?;
        let eligible = account
            .map(|a| a.is_active() && a.roles.contains(&Role::Authenticator))
            .unwrap_or(false);
        if !eligible {
            warn!(
                "Rejected authenticator swap: {} is not an active authenticator",
                format_address(&claimed_address)
            );
            return Err(BridgeError::AuthenticatorRejected(format!(
                "{} is not an active account holding the authenticator role",
                format_address(&claimed_address)
            )));
        }

        *self.current.write().await = Some(Arc::new(identity));
        info!("Authenticator set to {}", format_address(&claimed_address));
        Ok(())
    }
}
