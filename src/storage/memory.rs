//! In-memory implementation of [`Storage`].
//!
//! Backs local runs of the service binary and the test suite. It also keeps
//! an audit trail of role-ledger writes so callers can check how often the
//! ledger was touched.

use async_trait::async_trait;
use ethers::types::Address;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;

use super::Storage;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{
    format_address, Account, AccountStatus, BridgeTransferRequest, ClaimStatus, Role, RoleAction,
};

/// One role-ledger mutation, as recorded by [`InMemoryStore::ledger_writes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerWrite {
    pub address: Address,
    pub role: Role,
    pub action: RoleAction,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    accounts: RwLock<HashMap<Address, Account>>,
    transfers: RwLock<HashMap<String, BridgeTransferRequest>>,
    checkpoints: RwLock<HashMap<String, serde_json::Value>>,
    ledger_writes: RwLock<Vec<LedgerWrite>>,
    /// Remaining role-ledger writes that fail with a storage error
    failing_ledger_writes: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an account as-is.
    pub async fn insert_account(&self, account: Account) {
        self.accounts.write().await.insert(account.address, account);
    }

    /// Changes the status of an existing account.
    pub async fn set_account_status(&self, address: Address, status: AccountStatus) -> BridgeResult<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&address)
            .ok_or_else(|| BridgeError::Storage(format!("unknown account {}", format_address(&address))))?;
        account.status = status;
        Ok(())
    }

    /// Every role-ledger mutation applied so far, oldest first.
    pub async fn ledger_writes(&self) -> Vec<LedgerWrite> {
        self.ledger_writes.read().await.clone()
    }

    /// Makes the next `count` role-ledger writes fail with a storage error.
    pub fn fail_next_ledger_writes(&self, count: u32) {
        self.failing_ledger_writes.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> BridgeResult<()> {
        let injected = self
            .failing_ledger_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(BridgeError::Storage("injected ledger write failure".to_string())),
            Err(_) => Ok(()),
        }
    }

    async fn write_role(&self, address: Address, role: Role, action: RoleAction) -> BridgeResult<()> {
        self.take_injected_failure()?;
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&address)
            .ok_or_else(|| BridgeError::Storage(format!("unknown account {}", format_address(&address))))?;
        match action {
            RoleAction::Grant => account.roles.insert(role),
            RoleAction::Revoke => account.roles.remove(&role),
        };
        self.ledger_writes.write().await.push(LedgerWrite { address, role, action });
        Ok(())
    }
}

#[async_trait]
impl Storage for InMemoryStore {
    async fn get_account(&self, address: Address) -> BridgeResult<Option<Account>> {
        Ok(self.accounts.read().await.get(&address).cloned())
    }

    async fn create_account(&self, address: Address) -> BridgeResult<Account> {
        let mut accounts = self.accounts.write().await;
        Ok(accounts.entry(address).or_insert_with(|| Account::new(address)).clone())
    }

    async fn get_roles(&self, address: Address) -> BridgeResult<Vec<Role>> {
        Ok(self
            .accounts
            .read()
            .await
            .get(&address)
            .map(|account| account.roles.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn grant_role(&self, address: Address, role: Role) -> BridgeResult<()> {
        self.write_role(address, role, RoleAction::Grant).await
    }

    async fn revoke_role(&self, address: Address, role: Role) -> BridgeResult<()> {
        self.write_role(address, role, RoleAction::Revoke).await
    }

    async fn role_holders(&self, role: Role) -> BridgeResult<Vec<Address>> {
        let mut holders: Vec<Address> = self
            .accounts
            .read()
            .await
            .values()
            .filter(|account| account.roles.contains(&role))
            .map(|account| account.address)
            .collect();
        holders.sort();
        Ok(holders)
    }

    async fn upsert_bridge_transfer(&self, request: &BridgeTransferRequest) -> BridgeResult<()> {
        self.transfers
            .write()
            .await
            .insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn transition_claim_status(
        &self,
        id: &str,
        from: &[ClaimStatus],
        to: ClaimStatus,
    ) -> BridgeResult<Option<ClaimStatus>> {
        let mut transfers = self.transfers.write().await;
        Ok(transfers.get_mut(id).map(|request| {
            let previous = request.claim_status;
            if from.contains(&previous) {
                request.claim_status = to;
            }
            previous
        }))
    }

    async fn set_payout_tx_hash(&self, id: &str, tx_hash: &str) -> BridgeResult<bool> {
        let mut transfers = self.transfers.write().await;
        match transfers.get_mut(id) {
            Some(request) => {
                request.payout_tx_hash = Some(tx_hash.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_bridge_transfer(&self, id: &str) -> BridgeResult<Option<BridgeTransferRequest>> {
        Ok(self.transfers.read().await.get(id).cloned())
    }

    async fn get_bridge_transfer_by_deposit(
        &self,
        deposit_tx_hash: &str,
    ) -> BridgeResult<Option<BridgeTransferRequest>> {
        let wanted = deposit_tx_hash.to_lowercase();
        Ok(self
            .transfers
            .read()
            .await
            .values()
            .find(|request| request.deposit_tx_hash.to_lowercase() == wanted)
            .cloned())
    }

    async fn save_checkpoint(&self, process: &str, state: serde_json::Value) -> BridgeResult<()> {
        self.checkpoints.write().await.insert(process.to_string(), state);
        Ok(())
    }

    async fn load_checkpoint(&self, process: &str) -> BridgeResult<Option<serde_json::Value>> {
        Ok(self.checkpoints.read().await.get(process).cloned())
    }
}
