//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the bridge
//! settlement service. Configuration includes both chain endpoints and their
//! confirmation policy, the batching windows of the settlement aggregator,
//! claim-credential timing and the names of the environment variables that
//! hold signing keys.

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::parse_address;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "BRIDGE_SETTLEMENT_CONFIG_PATH";
/// Config file used when the environment variable is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config/bridge-settlement.toml";

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chain where users deposit
    pub source_chain: EvmChainConfig,
    /// Chain where payouts and claims happen
    pub destination_chain: EvmChainConfig,
    /// Batch settlement aggregator settings
    #[serde(default)]
    pub settlement: SettlementConfig,
    /// Claim credential settings
    pub claims: ClaimsConfig,
    /// Signing keys (environment variable names only)
    #[serde(default)]
    pub operator: OperatorConfig,
}

/// How a role change is confirmed on a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStrategy {
    /// Poll the role-membership view until it reports the expected value
    Poll,
    /// Return after submission; the event reconciler persists the change
    EventDelegated,
}

/// Configuration for an EVM-compatible chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmChainConfig {
    /// Human-readable name for the chain
    pub name: String,
    /// RPC endpoint URL for EVM chain communication
    pub rpc_url: String,
    /// Chain ID (e.g., 31337 for Hardhat, 1 for Ethereum mainnet)
    pub chain_id: u64,
    /// Bridge contract (payouts, claim invalidation)
    pub bridge_contract_addr: String,
    /// Access-control contract emitting RoleGranted/RoleRevoked
    pub role_contract_addr: String,
    /// Role confirmation policy for this chain
    #[serde(default = "default_confirmation_strategy")]
    pub confirmation_strategy: ConfirmationStrategy,
    /// Gas limit for every transaction the service sends
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Log polling interval of the event reconciler in milliseconds
    #[serde(default = "default_log_polling_interval_ms")]
    pub log_polling_interval_ms: u64,
}

/// Batching windows of the settlement aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SettlementConfig {
    /// Queue length that triggers an immediate flush
    pub batch_size: usize,
    /// Period of the age scan over all queues
    pub scan_interval_secs: u64,
    /// Queues older than this are flushed by the scan
    pub max_batch_age_secs: u64,
    /// Loop iterations before the process restarts itself
    pub continue_as_new_after: u64,
    /// Capacity of the enqueue signal channel
    pub signal_buffer: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            scan_interval_secs: 60,
            max_batch_age_secs: 120,
            continue_as_new_after: 6000,
            signal_buffer: 1024,
        }
    }
}

impl SettlementConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn max_batch_age(&self) -> Duration {
        Duration::from_secs(self.max_batch_age_secs)
    }
}

/// Claim credential settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimsConfig {
    /// Delay before an unredeemed credential is invalidated
    #[serde(default = "default_expiry_delay_secs")]
    pub expiry_delay_secs: u64,
    /// Version tag mixed into every signed claim payload
    pub contract_version: String,
    /// Timeout for the paired-chain deposit lookup in milliseconds
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

impl ClaimsConfig {
    pub fn expiry_delay(&self) -> Duration {
        Duration::from_secs(self.expiry_delay_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Signing keys are loaded from environment variables at runtime.
/// The config file contains the environment variable names, not the actual keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Environment variable holding the payer key (hex secp256k1)
    /// Default: "BRIDGE_OPERATOR_PRIVATE_KEY"
    #[serde(default = "default_operator_key_env")]
    pub private_key_env: String,
    /// Environment variable holding the initial authenticator key (optional at runtime)
    /// Default: "BRIDGE_AUTHENTICATOR_PRIVATE_KEY"
    #[serde(default = "default_authenticator_key_env")]
    pub authenticator_key_env: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_operator_key_env(),
            authenticator_key_env: default_authenticator_key_env(),
        }
    }
}

fn default_confirmation_strategy() -> ConfirmationStrategy {
    ConfirmationStrategy::Poll
}

fn default_gas_limit() -> u64 {
    500_000
}

fn default_log_polling_interval_ms() -> u64 {
    5_000
}

fn default_expiry_delay_secs() -> u64 {
    180
}

fn default_lookup_timeout_ms() -> u64 {
    30_000
}

fn default_operator_key_env() -> String {
    "BRIDGE_OPERATOR_PRIVATE_KEY".to_string()
}

fn default_authenticator_key_env() -> String {
    "BRIDGE_AUTHENTICATOR_PRIVATE_KEY".to_string()
}

impl OperatorConfig {
    /// Loads the payer private key from the environment variable.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The private key (hex encoded)
    /// * `Err(anyhow::Error)` - Failed to load from environment
    pub fn get_private_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.private_key_env).map_err(|_| {
            anyhow::anyhow!(
                "Environment variable '{}' not set. Please set it with the operator's secp256k1 private key (hex encoded).",
                self.private_key_env
            )
        })
    }

    /// Loads the authenticator private key, if one is provided.
    ///
    /// An absent key is a valid state: the service starts with an empty
    /// authenticator slot.
    pub fn get_authenticator_key(&self) -> Option<String> {
        std::env::var(&self.authenticator_key_env).ok()
    }
}

impl EvmChainConfig {
    pub fn bridge_contract(&self) -> anyhow::Result<Address> {
        parse_address(&self.bridge_contract_addr)
    }

    pub fn role_contract(&self) -> anyhow::Result<Address> {
        parse_address(&self.role_contract_addr)
    }

    pub fn log_polling_interval(&self) -> Duration {
        Duration::from_millis(self.log_polling_interval_ms)
    }
}

// ============================================================================
// CONFIGURATION LOADING AND MANAGEMENT
// ============================================================================

impl Config {
    /// Validates the configuration.
    ///
    /// This function ensures that:
    /// - Source and destination chain IDs differ
    /// - Contract addresses parse
    /// - Batch size and scan interval are non-zero
    /// - The claim contract version is set
    ///
    /// # Returns
    ///
    /// - `Ok(())` - Configuration is valid
    /// - `Err(anyhow::Error)` - The first problem found
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.source_chain.chain_id == self.destination_chain.chain_id {
            return Err(anyhow::anyhow!(
                "Configuration error: Source chain and destination chain have the same chain ID {}. Each chain must have a unique chain ID.",
                self.source_chain.chain_id
            ));
        }

        for chain in [&self.source_chain, &self.destination_chain] {
            chain.bridge_contract().map_err(|e| {
                anyhow::anyhow!("Configuration error: {} bridge_contract_addr: {}", chain.name, e)
            })?;
            chain.role_contract().map_err(|e| {
                anyhow::anyhow!("Configuration error: {} role_contract_addr: {}", chain.name, e)
            })?;
        }

        if self.settlement.batch_size == 0 {
            return Err(anyhow::anyhow!("Configuration error: settlement.batch_size must be at least 1"));
        }
        if self.settlement.scan_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "Configuration error: settlement.scan_interval_secs must be at least 1"
            ));
        }
        if self.claims.contract_version.trim().is_empty() {
            return Err(anyhow::anyhow!("Configuration error: claims.contract_version must not be empty"));
        }

        Ok(())
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the TOML file.
    ///
    /// This function:
    /// 1. Reads the path from `BRIDGE_SETTLEMENT_CONFIG_PATH` (default `config/bridge-settlement.toml`)
    /// 2. If it exists, loads and parses the configuration
    /// 3. Validates the configuration
    /// 4. If it doesn't exist, returns an error asking user to copy template
    ///
    /// # Returns
    ///
    /// - `Ok(Config)` - Successfully loaded and validated configuration
    /// - `Err(anyhow::Error)` - Failed to load configuration, file doesn't exist, or validation failed
    pub fn load() -> anyhow::Result<Self> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml_str(&content)
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/bridge-settlement.template.toml config/bridge-settlement.toml\n\
                Then edit config/bridge-settlement.toml with your actual values.",
                config_path
            ))
        }
    }

    /// Creates a default configuration with placeholder values.
    ///
    /// This configuration is suitable for local development and testing.
    /// For production use, all placeholder values must be replaced with
    /// actual chain URLs and contract addresses.
    pub fn default() -> Self {
        Self {
            source_chain: EvmChainConfig {
                name: "Source Chain".to_string(),
                rpc_url: "http://127.0.0.1:8545".to_string(),
                chain_id: 31337,
                bridge_contract_addr: "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string(),
                role_contract_addr: "0xe7f1725e7734ce288f8367e1bb143e90bb3f0512".to_string(),
                confirmation_strategy: ConfirmationStrategy::Poll,
                gas_limit: default_gas_limit(),
                log_polling_interval_ms: default_log_polling_interval_ms(),
            },
            destination_chain: EvmChainConfig {
                name: "Destination Chain".to_string(),
                rpc_url: "http://127.0.0.1:8546".to_string(),
                chain_id: 31338,
                bridge_contract_addr: "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string(),
                role_contract_addr: "0xe7f1725e7734ce288f8367e1bb143e90bb3f0512".to_string(),
                confirmation_strategy: ConfirmationStrategy::EventDelegated,
                gas_limit: default_gas_limit(),
                log_polling_interval_ms: default_log_polling_interval_ms(),
            },
            settlement: SettlementConfig::default(),
            claims: ClaimsConfig {
                expiry_delay_secs: default_expiry_delay_secs(),
                contract_version: "1".to_string(),
                lookup_timeout_ms: default_lookup_timeout_ms(),
            },
            operator: OperatorConfig::default(),
        }
    }
}
