//! Storage collaborator interface
//!
//! Persistence belongs to the storage layer; the sync layer only needs two
//! things from it: ownership lookups for routing decisions and the full
//! per-user reads behind snapshot computation. Both are asynchronous so the
//! router never blocks unrelated deliveries on a pending lookup.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ClaimParties, Snapshot, UserRole};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Read-side view of the storage layer used by the sync subsystem.
///
/// All lookups return `Ok(None)` for ids the store does not know; that is a
/// routing miss, not an error.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// The business that owns an offer
    async fn offer_owner(&self, offer_id: &str) -> Result<Option<String>, StoreError>;

    /// Both parties of a claim
    async fn claim_parties(&self, claim_id: &str) -> Result<Option<ClaimParties>, StoreError>;

    /// Both parties of the claim a message belongs to
    async fn message_parties(&self, message_id: &str) -> Result<Option<ClaimParties>, StoreError>;

    /// The user a notification is addressed to
    async fn notification_recipient(
        &self,
        notification_id: &str,
    ) -> Result<Option<String>, StoreError>;

    /// The influencer holding the claim a deliverable was submitted against
    async fn deliverable_assignee(
        &self,
        deliverable_id: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Full, freshly computed snapshot for one user
    async fn snapshot(&self, user_id: &str, role: UserRole) -> Result<Snapshot, StoreError>;
}
