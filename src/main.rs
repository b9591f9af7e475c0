//! Bridge Settlement Service
//!
//! Runs the long-lived settlement processes of the bridge:
//!
//! 1. The batch settlement aggregator paying out on the destination chain
//! 2. One role event reconciler per chain, keeping the role ledger in sync
//!
//! Role changes and claim credentials are driven by the API layer through the
//! library (`RoleEngine`, `ClaimManager`); this binary only hosts the
//! background processes.
//!
//! ## Security Requirements
//!
//! **CRITICAL**: This service holds the operator (payer) key and, when
//! configured, the authenticator key. Keys are read from environment
//! variables and never logged.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bridge_settlement::chain::{EvmClient, FeeOracle};
use bridge_settlement::claims::AuthenticatorSlot;
use bridge_settlement::config::{Config, CONFIG_PATH_ENV};
use bridge_settlement::crypto::SigningIdentity;
use bridge_settlement::roles::EventReconciler;
use bridge_settlement::settlement::SettlementAggregator;
use bridge_settlement::storage::InMemoryStore;
use bridge_settlement::types::{Account, Role};
use bridge_settlement::workflow::{spawn_process, TokioClock};
use bridge_settlement::Storage;

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

/// Main application entry point.
///
/// This function:
/// 1. Initializes logging and tracing
/// 2. Loads configuration from TOML file
/// 3. Loads signing keys from the environment
/// 4. Starts the aggregator and the reconcilers
/// 5. Runs until ctrl-c or until a process stops
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Bridge Settlement Service");

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("Bridge Settlement Service");
        println!();
        println!("Usage: bridge-settlement [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --config <path>   Use custom config file path");
        println!("  --help, -h        Show this help message");
        println!();
        println!("Environment variables:");
        println!("  {}    Path to config file (default config/bridge-settlement.toml)", CONFIG_PATH_ENV);
        println!("  RUST_LOG                         Log filter (default info)");
        return Ok(());
    }

    let mut i = 1; // Skip program name
    while i < args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            std::env::set_var(CONFIG_PATH_ENV, &args[i + 1]);
            info!("Using custom config: {}", args[i + 1]);
            i += 1;
        }
        i += 1;
    }

    let config = Config::load()?;
    info!("Configuration loaded successfully");

    let payer = Arc::new(
        SigningIdentity::from_hex(&config.operator.get_private_key()?)
            .context("Failed to load operator key")?,
    );
    info!("Operator address: {:#x}", payer.address());

    let store = Arc::new(InMemoryStore::new());
    let mut operator = Account::new(payer.address());
    operator.roles.insert(Role::Operator);
    store.insert_account(operator).await;
    let storage: Arc<dyn Storage> = store.clone();

    let slot = AuthenticatorSlot::new(storage.clone());
    match config.operator.get_authenticator_key() {
        Some(key) => {
            let identity = SigningIdentity::from_hex(&key).context("Failed to load authenticator key")?;
            let mut account = Account::new(identity.address());
            account.roles.insert(Role::Authenticator);
            store.insert_account(account).await;
            slot.set_current(identity.address(), &key).await?;
        }
        None => warn!(
            "No authenticator key in '{}'; claims are refused until one is set",
            config.operator.authenticator_key_env
        ),
    }

    let destination = Arc::new(
        EvmClient::from_config(&config.destination_chain).context("Failed to create destination chain client")?,
    );
    let source = Arc::new(
        EvmClient::from_config(&config.source_chain).context("Failed to create source chain client")?,
    );

    // Producers (deposit indexer, API) enqueue payouts through this handle
    let (aggregator, handle) = SettlementAggregator::new(
        destination.clone(),
        storage.clone(),
        Arc::new(FeeOracle::new()),
        payer.clone(),
        config.destination_chain.bridge_contract()?,
        config.destination_chain.gas_limit,
        config.settlement.clone(),
        Arc::new(TokioClock::new()),
    );

    let mut processes = vec![spawn_process("settlement_aggregator", aggregator.run())];
    for (chain_config, client) in [(&config.source_chain, source), (&config.destination_chain, destination)] {
        let reconciler = EventReconciler::new(
            client,
            storage.clone(),
            chain_config.role_contract()?,
            chain_config.log_polling_interval(),
        );
        info!(
            "{}: role confirmation strategy {:?}",
            chain_config.name, chain_config.confirmation_strategy
        );
        processes.push(spawn_process(format!("role_reconciler {}", chain_config.name), reconciler.run()));
    }

    info!("Bridge settlement service initialized successfully");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
        (result, index, _) = futures::future::select_all(processes) => {
            match result {
                Ok(Ok(())) => warn!("Process {} stopped", index),
                Ok(Err(e)) => error!("Process {} failed: {}", index, e),
                Err(e) => error!("Process {} panicked: {}", index, e),
            }
        }
    }

    drop(handle);
    Ok(())
}
