//! secp256k1 Key Generation Utility
//!
//! This binary generates a new secp256k1 key for the bridge settlement
//! service (operator/payer or authenticator).
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin generate_keys
//! ```
//!
//! ## Output
//!
//! - Private key (hex) - export it in the environment variable named by the config
//! - Address - register it on-chain (operator or authenticator role)

use bridge_settlement::crypto::SigningIdentity;

fn main() {
    let identity = SigningIdentity::random();

    println!("Generated secp256k1 Key:");
    println!("Private Key (hex): {}", identity.private_key_hex());
    println!("Address: {:#x}", identity.address());
    println!();
    println!("Export the private key as BRIDGE_OPERATOR_PRIVATE_KEY or BRIDGE_AUTHENTICATOR_PRIVATE_KEY.");
}
