//! Snapshot sync service
//!
//! Serves the initial payload after a fresh connection and the whole-state
//! fallback over plain request/response. Always freshly computed from the
//! storage collaborator; a user with no data yet gets an empty snapshot,
//! not an error.

use std::sync::Arc;

use crate::store::{StoreError, SyncStore};
use crate::types::{Snapshot, UserRole};

#[derive(Clone)]
pub struct SnapshotService {
    store: Arc<dyn SyncStore>,
}

impl SnapshotService {
    pub fn new(store: Arc<dyn SyncStore>) -> Self {
        Self { store }
    }

    pub async fn compute(&self, user_id: &str, role: UserRole) -> Result<Snapshot, StoreError> {
        let snapshot = self.store.snapshot(user_id, role).await?;
        tracing::debug!(
            target: "offersync::snapshot",
            user_id,
            role = %role,
            offers = snapshot.offers.len(),
            claims = snapshot.claims.len(),
            "snapshot computed"
        );
        Ok(snapshot)
    }
}
