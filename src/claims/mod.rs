//! Claim credentials: the authenticator key slot and the lifecycle manager.

pub mod authenticator;
pub mod manager;

pub use authenticator::AuthenticatorSlot;
pub use manager::{ClaimCredential, ClaimManager, ExpiryOutcome, EXPIRY_MAX_CHECKS};
