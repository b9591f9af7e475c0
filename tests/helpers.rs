//! Shared test helpers
//!
//! Constants, request builders, a scripted in-process chain adapter and a
//! recording notifier used across the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_settlement::chain::{ChainAdapter, TxRequest};
use bridge_settlement::crypto::SigningIdentity;
use bridge_settlement::error::{BridgeError, BridgeResult};
use bridge_settlement::notify::Notifier;
use bridge_settlement::types::{BridgeTransferRequest, ClaimStatus, Role};
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Log, H256, U256};
use std::sync::Mutex;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Hardhat account #0, used as the operator / payer
pub const OPERATOR_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
/// Hardhat account #1, used as the admin submitting role changes
pub const ADMIN_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
/// Hardhat account #2, used as the authenticator
pub const AUTHENTICATOR_KEY: &str = "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

pub const CONTRACT_VERSION: &str = "1";
pub const DUMMY_FEE: u64 = 1_000_000_000;

pub fn bridge_contract() -> Address {
    Address::repeat_byte(0xb0)
}

pub fn role_contract() -> Address {
    Address::repeat_byte(0xc0)
}

pub fn identity(key: &str) -> SigningIdentity {
    SigningIdentity::from_hex(key).expect("valid test key")
}

// ============================================================================
// BUILDERS
// ============================================================================

/// A bridge transfer request paying `n * 10` units of `token` to wallet `n`.
pub fn transfer(n: u64, token: Address) -> BridgeTransferRequest {
    BridgeTransferRequest {
        id: format!("req-{}", n),
        deposit_tx_hash: format!("0x{:064x}", n),
        source_token_addr: Address::repeat_byte(0xee),
        destination_token_addr: token,
        source_wallet_addr: Address::from_low_u64_be(10_000 + n),
        destination_wallet_addr: Address::from_low_u64_be(n),
        amount: U256::from(n * 10),
        request_id: U256::from(n),
        claim_status: ClaimStatus::Unconfirmed,
        payout_tx_hash: None,
    }
}

// ============================================================================
// CALLDATA DECODING
// ============================================================================

fn decode_args(calldata: &[u8], types: &[ParamType]) -> Vec<Token> {
    abi::decode(types, &calldata[4..]).expect("well-formed calldata")
}

fn address_array(token: Token) -> Vec<Address> {
    token
        .into_array()
        .expect("array")
        .into_iter()
        .map(|t| t.into_address().expect("address"))
        .collect()
}

fn uint_array(token: Token) -> Vec<U256> {
    token
        .into_array()
        .expect("array")
        .into_iter()
        .map(|t| t.into_uint().expect("uint"))
        .collect()
}

/// Decodes `batchTransfer(address,address[],uint256[])` calldata.
pub fn decode_payout(calldata: &[u8]) -> (Address, Vec<Address>, Vec<U256>) {
    let mut args = decode_args(
        calldata,
        &[
            ParamType::Address,
            ParamType::Array(Box::new(ParamType::Address)),
            ParamType::Array(Box::new(ParamType::Uint(256))),
        ],
    )
    .into_iter();
    let token = args.next().and_then(Token::into_address).expect("token");
    let recipients = address_array(args.next().expect("recipients"));
    let amounts = uint_array(args.next().expect("amounts"));
    (token, recipients, amounts)
}

/// Decodes `invalidateRequest(address,address,uint256,uint256,bytes)`, without the signature.
pub fn decode_invalidation(calldata: &[u8]) -> (Address, Address, U256, U256) {
    let mut args = decode_args(
        calldata,
        &[
            ParamType::Address,
            ParamType::Address,
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Bytes,
        ],
    )
    .into_iter();
    (
        args.next().and_then(Token::into_address).expect("token"),
        args.next().and_then(Token::into_address).expect("wallet"),
        args.next().and_then(Token::into_uint).expect("amount"),
        args.next().and_then(Token::into_uint).expect("request id"),
    )
}

// ============================================================================
// MOCK CHAIN
// ============================================================================

/// A transaction the mock chain accepted.
#[derive(Debug, Clone)]
pub struct Submission {
    pub from: Address,
    pub tx: TxRequest,
    pub tx_hash: String,
}

#[derive(Debug, Default)]
struct MockChainState {
    submissions: Vec<Submission>,
    failed_submissions: usize,
    fail_submissions: bool,
    hanging_submissions: usize,
    fail_fee: bool,
    fee: u64,
    nonce: u64,
    view_calls: usize,
    /// `(calls, value)`: `hasRole` answers `value` from the given call on, `!value` before
    has_role: Option<(usize, bool)>,
    never_value: bool,
    block_number: u64,
    logs: Vec<Log>,
    log_queries: Vec<(u64, u64)>,
}

/// In-process chain adapter scripted per test.
#[derive(Debug)]
pub struct MockChain {
    state: Mutex<MockChainState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockChainState {
                fee: DUMMY_FEE,
                ..MockChainState::default()
            }),
        }
    }

    /// `hasRole` reports `value` starting with call number `calls` (1-based).
    pub fn has_role_after(&self, calls: usize, value: bool) {
        self.state.lock().unwrap().has_role = Some((calls, value));
    }

    /// `hasRole` always reports `value`.
    pub fn has_role_always(&self, value: bool) {
        let mut state = self.state.lock().unwrap();
        state.has_role = None;
        state.never_value = value;
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.state.lock().unwrap().fail_submissions = fail;
    }

    /// The next `count` submissions never complete.
    pub fn hang_next_submissions(&self, count: usize) {
        self.state.lock().unwrap().hanging_submissions = count;
    }

    pub fn fail_fee(&self, fail: bool) {
        self.state.lock().unwrap().fail_fee = fail;
    }

    pub fn set_fee(&self, fee: u64) {
        self.state.lock().unwrap().fee = fee;
    }

    pub fn set_block_number(&self, block: u64) {
        self.state.lock().unwrap().block_number = block;
    }

    pub fn push_log(&self, log: Log) {
        self.state.lock().unwrap().logs.push(log);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn failed_submissions(&self) -> usize {
        self.state.lock().unwrap().failed_submissions
    }

    pub fn view_calls(&self) -> usize {
        self.state.lock().unwrap().view_calls
    }

    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().log_queries.clone()
    }
}

fn bool_word(value: bool) -> Vec<u8> {
    let mut word = vec![0u8; 32];
    word[31] = u8::from(value);
    word
}

fn log_block(log: &Log) -> u64 {
    log.block_number.map(|b| b.as_u64()).unwrap_or(0)
}

#[async_trait]
impl ChainAdapter for MockChain {
    async fn submit_tx(&self, from: &SigningIdentity, tx: TxRequest) -> BridgeResult<String> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            let hang = state.hanging_submissions > 0;
            if hang {
                state.hanging_submissions -= 1;
            }
            hang
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_submissions {
            state.failed_submissions += 1;
            return Err(BridgeError::Submission("mock chain rejected transaction".to_string()));
        }
        let tx_hash = format!("0x{:064x}", state.submissions.len() + 1);
        state.nonce += 1;
        state.submissions.push(Submission {
            from: from.address(),
            tx,
            tx_hash: tx_hash.clone(),
        });
        Ok(tx_hash)
    }

    async fn call_view(&self, _contract: Address, _data: Vec<u8>) -> BridgeResult<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.view_calls += 1;
        let answer = match state.has_role {
            Some((calls, value)) if state.view_calls >= calls => value,
            Some((_, value)) => !value,
            None => state.never_value,
        };
        Ok(bool_word(answer))
    }

    async fn pending_nonce(&self, _address: Address) -> BridgeResult<u64> {
        Ok(self.state.lock().unwrap().nonce)
    }

    async fn suggest_fee(&self) -> BridgeResult<U256> {
        let state = self.state.lock().unwrap();
        if state.fail_fee {
            return Err(BridgeError::Rpc("fee estimation unavailable".to_string()));
        }
        Ok(U256::from(state.fee))
    }

    async fn block_number(&self) -> BridgeResult<u64> {
        Ok(self.state.lock().unwrap().block_number)
    }

    async fn get_logs(
        &self,
        _contract: Address,
        _topics: &[H256],
        from_block: u64,
        to_block: u64,
    ) -> BridgeResult<Vec<Log>> {
        let mut state = self.state.lock().unwrap();
        state.log_queries.push((from_block, to_block));
        Ok(state
            .logs
            .iter()
            .filter(|log| (from_block..=to_block).contains(&log_block(log)))
            .cloned()
            .collect())
    }
}

// ============================================================================
// RECORDING NOTIFIER
// ============================================================================

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Role, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(Role, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_role(&self, role: Role, subject: &str, _body: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((role, subject.to_string()));
        Ok(())
    }
}
