//! EVM Client Module
//!
//! This module provides a client for communicating with EVM-compatible blockchain nodes
//! via their JSON-RPC API. Transactions are signed locally as legacy EIP-155
//! transactions and submitted with `eth_sendRawTransaction`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError};
use ethers::signers::Signer;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockNumber, Bytes, Filter, Log, TransactionRequest, ValueOrArray, H256, U256,
};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{ChainAdapter, TxRequest};
use crate::config::EvmChainConfig;
use crate::crypto::SigningIdentity;
use crate::error::{BridgeError, BridgeResult};
use crate::types::format_address;

/// Signs a legacy transaction with EIP-155 replay protection and returns the raw bytes.
pub fn sign_legacy_transaction(
    identity: &SigningIdentity,
    tx: &TxRequest,
    chain_id: u64,
) -> Result<Bytes> {
    let request = TransactionRequest::new()
        .from(identity.address())
        .to(tx.to)
        .data(tx.data.clone())
        .nonce(tx.nonce)
        .gas_price(tx.gas_price)
        .gas(tx.gas_limit)
        .value(U256::zero())
        .chain_id(chain_id);
    let typed: TypedTransaction = request.into();

    let wallet = identity.wallet(chain_id)?;
    let signature = wallet
        .sign_transaction_sync(&typed)
        .context("Failed to sign transaction")?;
    Ok(typed.rlp_signed(&signature))
}

fn rpc_error(e: ProviderError) -> BridgeError {
    BridgeError::Rpc(e.to_string())
}

// ============================================================================
// EVM CLIENT IMPLEMENTATION
// ============================================================================

/// Client for communicating with EVM-compatible blockchain nodes via JSON-RPC
pub struct EvmClient {
    provider: Provider<Http>,
    /// Base URL of the EVM node (e.g., "http://127.0.0.1:8545")
    base_url: String,
    /// Chain ID used for EIP-155 signatures
    chain_id: u64,
}

impl EvmClient {
    /// Creates a new EVM client for the given node URL
    ///
    /// # Arguments
    ///
    /// * `node_url` - Base URL of the EVM node (e.g., "http://127.0.0.1:8545")
    /// * `chain_id` - Chain ID for transaction signing
    pub fn new(node_url: &str, chain_id: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;
        let url = Url::parse(node_url)
            .with_context(|| format!("Invalid EVM node URL {}", node_url))?;
        let provider = Provider::new(Http::new_with_client(url, client));

        Ok(Self {
            provider,
            base_url: node_url.to_string(),
            chain_id,
        })
    }

    /// Creates a client from a chain configuration section.
    pub fn from_config(config: &EvmChainConfig) -> Result<Self> {
        Self::new(&config.rpc_url, config.chain_id)
    }

    /// Returns the base URL of this client
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChainAdapter for EvmClient {
    async fn submit_tx(&self, from: &SigningIdentity, tx: TxRequest) -> BridgeResult<String> {
        let raw = sign_legacy_transaction(from, &tx, self.chain_id)
            .map_err(|e| BridgeError::Signing(format!("{:#}", e)))?;
        debug!(
            "Submitting tx from {} to {} nonce={} gas_price={}",
            format_address(&from.address()),
            format_address(&tx.to),
            tx.nonce,
            tx.gas_price
        );
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| BridgeError::Submission(e.to_string()))?;
        Ok(format!("{:#x}", pending.tx_hash()))
    }

    async fn call_view(&self, contract: Address, data: Vec<u8>) -> BridgeResult<Vec<u8>> {
        let call: TypedTransaction = TransactionRequest::new().to(contract).data(data).into();
        let result = self.provider.call(&call, None).await.map_err(rpc_error)?;
        Ok(result.to_vec())
    }

    async fn pending_nonce(&self, address: Address) -> BridgeResult<u64> {
        let nonce = self
            .provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(rpc_error)?;
        u64::try_from(nonce).map_err(|e| BridgeError::Rpc(format!("Nonce out of range: {}", e)))
    }

    async fn suggest_fee(&self) -> BridgeResult<U256> {
        self.provider.get_gas_price().await.map_err(rpc_error)
    }

    async fn block_number(&self) -> BridgeResult<u64> {
        let block = self.provider.get_block_number().await.map_err(rpc_error)?;
        Ok(block.as_u64())
    }

    async fn get_logs(
        &self,
        contract: Address,
        topics: &[H256],
        from_block: u64,
        to_block: u64,
    ) -> BridgeResult<Vec<Log>> {
        // An array in position 0 means "topic0 is any of these"
        let filter = Filter::new()
            .address(contract)
            .topic0(ValueOrArray::Array(topics.iter().map(|t| Some(*t)).collect()))
            .from_block(from_block)
            .to_block(to_block);
        self.provider.get_logs(&filter).await.map_err(rpc_error)
    }
}
