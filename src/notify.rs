//! Notification Collaborator
//!
//! Best-effort messages to everyone holding a role. Delivery failures are
//! returned to the caller, which logs them; nothing waits on a notification.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::storage::Storage;
use crate::types::{format_address, Role};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `subject`/`body` to every holder of `role`.
    async fn notify_role(&self, role: Role, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Notifier that writes one structured log line per role holder.
///
/// Stands in for an email sender when the service runs without one.
pub struct LogNotifier {
    storage: Arc<dyn Storage>,
}

impl LogNotifier {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_role(&self, role: Role, subject: &str, body: &str) -> anyhow::Result<()> {
        let holders = self
            .storage
            .role_holders(role)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to load {} holders: {}", role, e))?;
        if holders.is_empty() {
            warn!(role = %role, subject, "No role holders to notify");
        }
        for holder in holders {
            warn!(role = %role, recipient = %format_address(&holder), subject, body, "Notification");
        }
        Ok(())
    }
}
