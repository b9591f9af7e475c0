//! Get Authenticator Address
//!
//! This binary reads the bridge settlement configuration, loads the
//! authenticator key from the environment variable it names and prints the
//! Ethereum address derived from it. Grant this address the authenticator
//! role before setting it as the current authenticator.

use anyhow::Result;
use bridge_settlement::config::Config;
use bridge_settlement::crypto::SigningIdentity;

fn main() -> Result<()> {
    let config = Config::load()?;

    let key = config.operator.get_authenticator_key().ok_or_else(|| {
        anyhow::anyhow!(
            "Environment variable '{}' not set",
            config.operator.authenticator_key_env
        )
    })?;
    let identity = SigningIdentity::from_hex(&key)?;

    println!("{:#x}", identity.address());

    Ok(())
}
