//! Paired-chain deposit lookup.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::storage::Storage;
use crate::types::BridgeTransferRequest;

/// Resolves a source-chain deposit transaction to its bridge transfer request.
#[async_trait]
pub trait DepositLookup: Send + Sync {
    async fn get_deposit_by_tx_hash(&self, tx_hash: &str) -> BridgeResult<BridgeTransferRequest>;
}

/// Lookup backed by the requests the deposit indexer already stored.
pub struct StorageDepositLookup {
    storage: Arc<dyn Storage>,
}

impl StorageDepositLookup {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl DepositLookup for StorageDepositLookup {
    async fn get_deposit_by_tx_hash(&self, tx_hash: &str) -> BridgeResult<BridgeTransferRequest> {
        self.storage
            .get_bridge_transfer_by_deposit(tx_hash)
            .await
            .map_err(|e| BridgeError::LookupFailed(e.to_string()))?
            .ok_or_else(|| BridgeError::LookupFailed(format!("no deposit found for {}", tx_hash)))
    }
}
