//! Cryptographic Operations Module
//!
//! This module handles the secp256k1 operations of the settlement service:
//! key loading, Ethereum address derivation, the claim-credential payload and
//! recoverable ECDSA signatures that the bridge contracts verify with
//! `ecrecover`.
//!
//! ## Security Requirements
//!
//! **CRITICAL**: Private keys must never be exposed or logged. `SigningIdentity`
//! deliberately prints only its address.

use anyhow::{Context, Result};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use std::fmt;

// ============================================================================
// HASHING
// ============================================================================

/// keccak256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Big-endian 32-byte encoding of a uint256.
pub fn u256_to_be_bytes(value: &U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

/// Hash of the canonical claim payload.
///
/// Layout matches Solidity `abi.encodePacked(address token, address wallet,
/// uint256 amount, uint256 requestId, string version)`:
/// `token(20) || wallet(20) || amount(32, BE) || requestId(32, BE) || utf8(version)`.
pub fn claim_message_hash(
    token_addr: &Address,
    wallet_addr: &Address,
    amount: &U256,
    request_id: &U256,
    contract_version: &str,
) -> [u8; 32] {
    let mut packed = Vec::with_capacity(20 + 20 + 32 + 32 + contract_version.len());
    packed.extend_from_slice(token_addr.as_bytes());
    packed.extend_from_slice(wallet_addr.as_bytes());
    packed.extend_from_slice(&u256_to_be_bytes(amount));
    packed.extend_from_slice(&u256_to_be_bytes(request_id));
    packed.extend_from_slice(contract_version.as_bytes());
    keccak256(&packed)
}

/// Applies the Ethereum signed-message prefix to a 32-byte hash.
///
/// `keccak256("\x19Ethereum Signed Message:\n" || len(hash) || hash)` where the
/// length is written in decimal, i.e. always `"32"`.
pub fn eth_signed_message_hash(message_hash: &[u8; 32]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message_hash.len());
    let mut prefixed = Vec::with_capacity(prefix.len() + message_hash.len());
    prefixed.extend_from_slice(prefix.as_bytes());
    prefixed.extend_from_slice(message_hash);
    keccak256(&prefixed)
}

/// Derives the Ethereum address of a secp256k1 public key.
///
/// `keccak256(uncompressed_public_key[1..])[12..32]`
pub fn address_from_verifying_key(verifying_key: &VerifyingKey) -> Address {
    let point = verifying_key.to_encoded_point(false);
    // Uncompressed format: 0x04 || x (32 bytes) || y (32 bytes)
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..32])
}

/// Recovers the signer address of a 65-byte `r || s || v` signature over `prehash`.
pub fn recover_address(prehash: &[u8; 32], signature: &[u8]) -> Result<Address> {
    if signature.len() != 65 {
        anyhow::bail!("Invalid signature length: expected 65 bytes, got {}", signature.len());
    }
    let sig = Signature::from_slice(&signature[..64]).context("Invalid r || s encoding")?;
    let v = signature[64];
    let recovery_byte = if v >= 27 { v - 27 } else { v };
    let recovery_id = RecoveryId::from_byte(recovery_byte)
        .ok_or_else(|| anyhow::anyhow!("Invalid recovery id: {}", v))?;
    let verifying_key = VerifyingKey::recover_from_prehash(prehash, &sig, recovery_id)
        .context("Failed to recover public key")?;
    Ok(address_from_verifying_key(&verifying_key))
}

// ============================================================================
// SIGNING IDENTITY
// ============================================================================

/// A secp256k1 private key together with the address it controls.
#[derive(Clone)]
pub struct SigningIdentity {
    signing_key: SigningKey,
    address: Address,
}

impl SigningIdentity {
    /// Builds an identity from 32 raw private-key bytes.
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        if secret.len() != 32 {
            anyhow::bail!(
                "Invalid private key length: expected 32 bytes, got {}",
                secret.len()
            );
        }
        let signing_key = SigningKey::from_slice(secret)
            .map_err(|e| anyhow::anyhow!("Failed to create ECDSA signing key: {}", e))?;
        let address = address_from_verifying_key(signing_key.verifying_key());
        Ok(Self {
            signing_key,
            address,
        })
    }

    /// Builds an identity from a hex private key, with or without `0x` prefix.
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let clean = private_key.trim();
        let clean = clean.strip_prefix("0x").unwrap_or(clean);
        let bytes = hex::decode(clean).context("Invalid private key hex")?;
        Self::from_bytes(&bytes)
    }

    /// Generates a fresh random identity.
    pub fn random() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let address = address_from_verifying_key(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Hex-encoded private key. Only the key-generation binary uses this.
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signing_key.to_bytes()))
    }

    /// ethers wallet over the same key, bound to `chain_id` for EIP-155 signing.
    pub fn wallet(&self, chain_id: u64) -> Result<LocalWallet> {
        let wallet = LocalWallet::from_bytes(&self.signing_key.to_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to create wallet: {}", e))?;
        Ok(wallet.with_chain_id(chain_id))
    }

    /// Signs a 32-byte prehash, returning the signature and raw recovery id (0 or 1).
    fn sign_prehash_recoverable(&self, prehash: &[u8; 32]) -> Result<(Signature, u8)> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(prehash)
            .map_err(|e| anyhow::anyhow!("Failed to sign precomputed hash: {}", e))?;
        Ok((signature, recovery_id.to_byte()))
    }

    /// Signs a 32-byte prehash in Ethereum format: `r || s || v`, `v` in {27, 28}.
    pub fn sign_prehash(&self, prehash: &[u8; 32]) -> Result<Vec<u8>> {
        let (signature, recovery_id) = self.sign_prehash_recoverable(prehash)?;
        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&signature.to_bytes());
        out.push(recovery_id + 27);
        Ok(out)
    }

    /// Signs a claim payload the way the bridge contract verifies it.
    pub fn sign_claim(
        &self,
        token_addr: &Address,
        wallet_addr: &Address,
        amount: &U256,
        request_id: &U256,
        contract_version: &str,
    ) -> Result<Vec<u8>> {
        let message_hash =
            claim_message_hash(token_addr, wallet_addr, amount, request_id, contract_version);
        self.sign_prehash(&eth_signed_message_hash(&message_hash))
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known Hardhat account #0
    const HARDHAT_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const HARDHAT_ADDR: &str = "f39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    #[test]
    fn test_address_derivation_matches_known_account() {
        let identity = SigningIdentity::from_hex(HARDHAT_KEY).unwrap();
        assert_eq!(hex::encode(identity.address().as_bytes()), HARDHAT_ADDR);
    }

    #[test]
    fn test_signed_message_prefix() {
        let hash = [7u8; 32];
        let mut expected = b"\x19Ethereum Signed Message:\n32".to_vec();
        expected.extend_from_slice(&hash);
        assert_eq!(eth_signed_message_hash(&hash), keccak256(&expected));
    }

    #[test]
    fn test_signature_recovers_signer() {
        let identity = SigningIdentity::from_hex(HARDHAT_KEY).unwrap();
        let prehash = keccak256(b"bridge");
        let sig = identity.sign_prehash(&prehash).unwrap();
        assert_eq!(sig.len(), 65);
        assert!(sig[64] == 27 || sig[64] == 28);
        assert_eq!(recover_address(&prehash, &sig).unwrap(), identity.address());
    }

    #[test]
    fn test_wallet_shares_address() {
        let identity = SigningIdentity::from_hex(HARDHAT_KEY).unwrap();
        let wallet = identity.wallet(31337).unwrap();
        assert_eq!(wallet.address(), identity.address());
        assert_eq!(wallet.chain_id(), 31337);
    }

    #[test]
    fn test_rejects_short_key() {
        assert!(SigningIdentity::from_hex("0x1234").is_err());
    }
}
