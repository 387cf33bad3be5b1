//! Change router
//!
//! Decides who receives an entity change and delivers it exactly once per
//! eligible session per change. Changes queue on an unbounded channel; a
//! single task drains them on a fixed flush interval so bursty mutations
//! collapse into one delivery pass instead of one frame per mutation per
//! client. Flushes never overlap: the loop awaits each flush before the
//! next tick.
//!
//! Ownership lookups go through the storage collaborator and run
//! concurrently within a flush; deliveries then happen in enqueue order, so
//! order within a single target session is FIFO relative to enqueue time.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;

use crate::protocol::{Envelope, Frame};
use crate::store::SyncStore;
use crate::types::{EntityChange, EntityKind, UserRole};

use super::registry::{ClientRegistry, SessionHandle};

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Fixed flush cadence; a backpressure valve, not a correctness knob
    pub flush_interval: Duration,
    /// Queue length that forces an early flush
    pub max_batch: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(1),
            max_batch: 256,
        }
    }
}

/// Cloneable intake side of the router
#[derive(Clone)]
pub struct RouterHandle {
    tx: mpsc::UnboundedSender<EntityChange>,
}

impl RouterHandle {
    /// Queue a change for the next flush. Changes enqueued after the router
    /// task has stopped are dropped with a warning.
    pub fn enqueue(&self, change: EntityChange) {
        if self.tx.send(change).is_err() {
            tracing::warn!(target: "offersync::router", "router stopped; change dropped");
        }
    }
}

/// The routing/delivery task. Owns the queue receiver; construct with
/// [`ChangeRouter::new`] and drive it with [`ChangeRouter::run`].
pub struct ChangeRouter {
    registry: Arc<ClientRegistry>,
    store: Arc<dyn SyncStore>,
    config: RouterConfig,
    rx: mpsc::UnboundedReceiver<EntityChange>,
}

impl ChangeRouter {
    pub fn new(
        registry: Arc<ClientRegistry>,
        store: Arc<dyn SyncStore>,
        config: RouterConfig,
    ) -> (RouterHandle, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            RouterHandle { tx },
            Self {
                registry,
                store,
                config,
                rx,
            },
        )
    }

    /// Run until every intake handle is dropped; flushes the remainder on
    /// shutdown.
    pub async fn run(mut self) {
        let mut timer = interval(self.config.flush_interval);
        timer.tick().await; // first tick completes immediately
        let mut pending: Vec<EntityChange> = Vec::new();

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.flush(&mut pending).await;
                }
                change = self.rx.recv() => {
                    match change {
                        Some(c) => {
                            pending.push(c);
                            if pending.len() >= self.config.max_batch {
                                self.flush(&mut pending).await;
                            }
                        }
                        None => {
                            self.flush(&mut pending).await;
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Route and deliver everything queued so far
    async fn flush(&self, pending: &mut Vec<EntityChange>) {
        if pending.is_empty() {
            return;
        }
        let batch = std::mem::take(pending);

        // Resolve ownership for the whole batch concurrently; no registry
        // entry is locked while a lookup is pending.
        let targets =
            futures::future::join_all(batch.iter().map(|change| self.resolve_targets(change)))
                .await;

        // Deliver in enqueue order to keep per-session FIFO.
        for (change, sessions) in batch.into_iter().zip(targets) {
            let mut delivered = 0usize;
            for session in &sessions {
                if session.send(Envelope::stamped(Frame::Update(change.clone()))) {
                    delivered += 1;
                } else {
                    // Broken or deregistered transport: no retry, no removal
                    // (removal is the registry's job, driven by close events).
                    tracing::debug!(
                        target: "offersync::router",
                        session_id = %session.session_id,
                        "delivery skipped: session gone"
                    );
                }
            }
            tracing::debug!(
                target: "offersync::router",
                entity_type = %change.entity_type,
                entity_id = %change.entity_id,
                delivered,
                "change routed"
            );
        }
    }

    /// The set of sessions entitled to see a change, deduplicated.
    ///
    /// A failed or empty ownership lookup drops only the branch that needed
    /// it; remaining branches of the same change still deliver.
    async fn resolve_targets(&self, change: &EntityChange) -> Vec<Arc<SessionHandle>> {
        let mut targets: Vec<Arc<SessionHandle>> = Vec::new();

        match change.entity_type {
            EntityKind::Offer => {
                // Owning business, minus the originator's own sessions
                match self.store.offer_owner(&change.entity_id).await {
                    Ok(Some(owner)) => targets.extend(self.registry.sessions_for_user(&owner)),
                    Ok(None) => self.lookup_miss(change, "offer owner"),
                    Err(err) => self.lookup_failed(change, "offer owner", &err),
                }
                // Offers are broadcast: any influencer might be a match
                targets.extend(self.registry.sessions_with_role(UserRole::Influencer));
                targets.retain(|s| s.user_id != change.originating_user_id);
            }
            EntityKind::Claim => match self.store.claim_parties(&change.entity_id).await {
                Ok(Some(parties)) => {
                    targets.extend(self.registry.sessions_for_user(&parties.business_id));
                    targets.extend(self.registry.sessions_for_user(&parties.influencer_id));
                }
                Ok(None) => self.lookup_miss(change, "claim parties"),
                Err(err) => self.lookup_failed(change, "claim parties", &err),
            },
            EntityKind::Message => match self.store.message_parties(&change.entity_id).await {
                Ok(Some(parties)) => {
                    targets.extend(self.registry.sessions_for_user(&parties.business_id));
                    targets.extend(self.registry.sessions_for_user(&parties.influencer_id));
                    targets.retain(|s| s.user_id != change.originating_user_id);
                }
                Ok(None) => self.lookup_miss(change, "message parties"),
                Err(err) => self.lookup_failed(change, "message parties", &err),
            },
            EntityKind::Notification => {
                match self.store.notification_recipient(&change.entity_id).await {
                    Ok(Some(recipient)) => {
                        targets.extend(self.registry.sessions_for_user(&recipient));
                    }
                    Ok(None) => self.lookup_miss(change, "notification recipient"),
                    Err(err) => self.lookup_failed(change, "notification recipient", &err),
                }
            }
            EntityKind::Deliverable => {
                match self.store.deliverable_assignee(&change.entity_id).await {
                    Ok(Some(assignee)) => {
                        targets.extend(self.registry.sessions_for_user(&assignee));
                    }
                    Ok(None) => self.lookup_miss(change, "deliverable assignee"),
                    Err(err) => self.lookup_failed(change, "deliverable assignee", &err),
                }
            }
        }

        // Exactly once per session per change, whatever the branch overlap
        let mut seen: HashSet<String> = HashSet::with_capacity(targets.len());
        targets.retain(|s| seen.insert(s.session_id.clone()));
        targets
    }

    fn lookup_miss(&self, change: &EntityChange, what: &str) {
        tracing::debug!(
            target: "offersync::router",
            entity_type = %change.entity_type,
            entity_id = %change.entity_id,
            "{} not found; branch dropped",
            what
        );
    }

    fn lookup_failed(&self, change: &EntityChange, what: &str, err: &crate::store::StoreError) {
        tracing::warn!(
            target: "offersync::router",
            entity_type = %change.entity_type,
            entity_id = %change.entity_id,
            error = %err,
            "{} lookup failed; branch dropped",
            what
        );
    }
}
