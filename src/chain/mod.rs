//! Chain Adapter Module
//!
//! The narrow interface the settlement core uses to reach a chain: submit a
//! signed transaction, call a view method, fetch the pending nonce, estimate
//! the fee and read logs. One adapter instance exists per chain.

pub mod calldata;
pub mod evm;

use async_trait::async_trait;
use ethers::types::{Address, Log, H256, U256};
use tokio::sync::Mutex;
use tracing::warn;

use crate::crypto::SigningIdentity;
use crate::error::{BridgeError, BridgeResult};

pub use evm::EvmClient;

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// A contract call ready to be signed and submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    /// Contract being called
    pub to: Address,
    /// ABI-encoded calldata
    pub data: Vec<u8>,
    /// Sender nonce
    pub nonce: u64,
    /// Gas price in wei
    pub gas_price: U256,
    /// Gas limit
    pub gas_limit: u64,
}

// ============================================================================
// ADAPTER TRAIT
// ============================================================================

/// Per-chain client used by every orchestration process.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Signs `tx` with `from` and submits it, returning the transaction hash.
    async fn submit_tx(&self, from: &SigningIdentity, tx: TxRequest) -> BridgeResult<String>;

    /// Executes a read-only contract call and returns the raw return data.
    async fn call_view(&self, contract: Address, data: Vec<u8>) -> BridgeResult<Vec<u8>>;

    /// Nonce to use for the next transaction from `address`, including pending ones.
    async fn pending_nonce(&self, address: Address) -> BridgeResult<u64>;

    /// Current fee suggestion (gas price in wei).
    async fn suggest_fee(&self) -> BridgeResult<U256>;

    /// Latest block number.
    async fn block_number(&self) -> BridgeResult<u64>;

    /// Logs emitted by `contract` whose first topic is one of `topics`,
    /// in the inclusive block range.
    async fn get_logs(
        &self,
        contract: Address,
        topics: &[H256],
        from_block: u64,
        to_block: u64,
    ) -> BridgeResult<Vec<Log>>;
}

// ============================================================================
// FEE ORACLE
// ============================================================================

/// Fee estimation with fallback to the last fee that was successfully used.
///
/// An estimation failure is not fatal as long as some fee has worked before.
#[derive(Debug, Default)]
pub struct FeeOracle {
    last_used: Mutex<Option<U256>>,
}

impl FeeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh estimate, or the last used fee when estimation fails.
    pub async fn estimate(&self, chain: &dyn ChainAdapter) -> BridgeResult<U256> {
        match chain.suggest_fee().await {
            Ok(fee) => Ok(fee),
            Err(e) => {
                let last = *self.last_used.lock().await;
                match last {
                    Some(fee) => {
                        warn!("Fee estimation failed ({}), falling back to last used fee {}", e, fee);
                        Ok(fee)
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Records a fee that a submitted transaction was accepted with.
    pub async fn record_success(&self, fee: U256) {
        *self.last_used.lock().await = Some(fee);
    }

    pub async fn last_used(&self) -> Option<U256> {
        *self.last_used.lock().await
    }
}

/// Builds, prices and submits a single contract call from `from`.
///
/// Fetches the pending nonce and a fee estimate (with fallback), submits once
/// and records the fee on success. Submission is never retried here: a
/// retried submission after an unknown outcome could land twice.
pub async fn send_contract_call(
    chain: &dyn ChainAdapter,
    fees: &FeeOracle,
    from: &SigningIdentity,
    to: Address,
    data: Vec<u8>,
    gas_limit: u64,
) -> BridgeResult<String> {
    let nonce = chain.pending_nonce(from.address()).await?;
    let gas_price = fees.estimate(chain).await?;
    let tx = TxRequest {
        to,
        data,
        nonce,
        gas_price,
        gas_limit,
    };
    let tx_hash = chain.submit_tx(from, tx).await.map_err(|e| match e {
        BridgeError::Submission(_) | BridgeError::Signing(_) => e,
        other => BridgeError::Submission(other.to_string()),
    })?;
    fees.record_success(gas_price).await;
    Ok(tx_hash)
}
