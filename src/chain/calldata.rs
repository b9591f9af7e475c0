//! Calldata for the bridge and access-control contracts
//!
//! Thin builders over `ethers::abi` for the handful of contract methods the
//! settlement core calls.

use anyhow::Context;
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, U256};
use ethers::utils::id;

use crate::types::{Role, RoleAction};

/// Access-control membership view.
pub const HAS_ROLE_SIGNATURE: &str = "hasRole(bytes32,address)";

/// Bridge contract method paying one token out to many recipients.
pub const PAYOUT_SIGNATURE: &str = "batchTransfer(address,address[],uint256[])";

/// Bridge contract method burning a request ID.
pub const INVALIDATE_SIGNATURE: &str = "invalidateRequest(address,address,uint256,uint256,bytes)";

/// Selector of `signature` followed by the ABI-encoded `tokens`.
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = id(signature).to_vec();
    data.extend(abi::encode(tokens));
    data
}

/// `grantRole` / `revokeRole` for `target`.
pub fn role_change(action: RoleAction, role: Role, target: Address) -> Vec<u8> {
    encode_call(
        action.method_signature(),
        &[Token::FixedBytes(role.role_id().to_vec()), Token::Address(target)],
    )
}

pub fn has_role(role: Role, target: Address) -> Vec<u8> {
    encode_call(
        HAS_ROLE_SIGNATURE,
        &[Token::FixedBytes(role.role_id().to_vec()), Token::Address(target)],
    )
}

/// One multi-recipient payout; `recipients` and `amounts` are parallel.
pub fn batch_transfer(token: Address, recipients: &[Address], amounts: &[U256]) -> Vec<u8> {
    encode_call(
        PAYOUT_SIGNATURE,
        &[
            Token::Address(token),
            Token::Array(recipients.iter().copied().map(Token::Address).collect()),
            Token::Array(amounts.iter().copied().map(Token::Uint).collect()),
        ],
    )
}

pub fn invalidate_request(
    token: Address,
    wallet: Address,
    amount: U256,
    request_id: U256,
    signature: Vec<u8>,
) -> Vec<u8> {
    encode_call(
        INVALIDATE_SIGNATURE,
        &[
            Token::Address(token),
            Token::Address(wallet),
            Token::Uint(amount),
            Token::Uint(request_id),
            Token::Bytes(signature),
        ],
    )
}

/// Decodes a single `bool` return value.
pub fn decode_bool(data: &[u8]) -> anyhow::Result<bool> {
    abi::decode(&[ParamType::Bool], data)
        .context("Invalid bool return data")?
        .into_iter()
        .next()
        .and_then(Token::into_bool)
        .context("Missing bool return value")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_change_selectors() {
        let target = Address::repeat_byte(0x11);
        let grant = role_change(RoleAction::Grant, Role::Admin, target);
        assert_eq!(hex::encode(&grant[..4]), "2f2ff15d");
        assert_eq!(&grant[4..36], &Role::Admin.role_id());
        assert_eq!(hex::encode(&has_role(Role::Admin, target)[..4]), "91d14854");
    }

    #[test]
    fn test_decode_bool() {
        let mut word = [0u8; 32];
        assert!(!decode_bool(&word).unwrap());
        word[31] = 1;
        assert!(decode_bool(&word).unwrap());
        assert!(decode_bool(&[1u8; 4]).is_err());
    }
}
