//! In-memory table of connected sessions
//!
//! Dual index (session id, user id) so lifecycle churn on one session never
//! contends with delivery to another. A session's presence here is the sole
//! authorization for receiving pushed changes: `deregister` marks the handle
//! closed before removing it, so delivery halts atomically with removal.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::protocol::{Envelope, Frame};
use crate::types::UserRole;

pub type SessionId = String;

/// One registered push-channel session
pub struct SessionHandle {
    pub session_id: SessionId,
    pub user_id: String,
    pub role: UserRole,
    sender: UnboundedSender<Envelope>,
    last_activity: AtomicI64,
    closed: AtomicBool,
}

impl SessionHandle {
    fn new(user_id: String, role: UserRole, sender: UnboundedSender<Envelope>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id,
            role,
            sender,
            last_activity: AtomicI64::new(chrono::Utc::now().timestamp()),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue an envelope for the session's socket task.
    ///
    /// Returns false without retrying when the session is closed or its
    /// transport side is gone; removal stays the registry's job.
    pub fn send(&self, envelope: Envelope) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.sender.send(envelope).is_ok()
    }

    /// Refresh the liveness timestamp
    pub fn touch(&self) {
        self.last_activity
            .store(chrono::Utc::now().timestamp(), Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn idle_seconds(&self, now: i64) -> i64 {
        now - self.last_activity.load(Ordering::Acquire)
    }
}

/// Registry of currently connected sessions
#[derive(Default)]
pub struct ClientRegistry {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    user_index: DashMap<String, HashSet<SessionId>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly authenticated transport. Multiple concurrent
    /// sessions per user are permitted and independent.
    pub fn register(
        &self,
        user_id: impl Into<String>,
        role: UserRole,
        sender: UnboundedSender<Envelope>,
    ) -> Arc<SessionHandle> {
        let handle = Arc::new(SessionHandle::new(user_id.into(), role, sender));

        self.sessions
            .insert(handle.session_id.clone(), handle.clone());
        self.user_index
            .entry(handle.user_id.clone())
            .or_default()
            .insert(handle.session_id.clone());

        tracing::info!(
            target: "offersync::registry",
            session_id = %handle.session_id,
            user_id = %handle.user_id,
            role = %handle.role,
            "session registered"
        );
        handle
    }

    /// Remove a session immediately. Safe to call concurrently with an
    /// in-flight delivery: the handle is closed before the entry goes away,
    /// so a delivery either observed a live session or observes nothing.
    pub fn deregister(&self, session_id: &str) {
        if let Some((_, handle)) = self.sessions.remove(session_id) {
            handle.close();

            if let Some(mut entry) = self.user_index.get_mut(&handle.user_id) {
                entry.remove(session_id);
                if entry.is_empty() {
                    drop(entry);
                    self.user_index.remove(&handle.user_id);
                }
            }

            tracing::info!(
                target: "offersync::registry",
                session_id = %session_id,
                user_id = %handle.user_id,
                "session deregistered"
            );
        }
    }

    /// Refresh a session's liveness timestamp
    pub fn touch(&self, session_id: &str) {
        if let Some(handle) = self.sessions.get(session_id) {
            handle.touch();
        }
    }

    /// All live sessions for one user
    pub fn sessions_for_user(&self, user_id: &str) -> Vec<Arc<SessionHandle>> {
        match self.user_index.get(user_id) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.sessions.get(id).map(|e| e.value().clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// All live sessions whose user holds the given role
    pub fn sessions_with_role(&self, role: UserRole) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .iter()
            .filter(|e| e.value().role == role)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Push an out-of-band notice to every session of one user
    pub fn notify_user(&self, user_id: &str, payload: serde_json::Value) {
        for session in self.sessions_for_user(user_id) {
            session.send(Envelope::stamped(Frame::Notification(payload.clone())));
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Deregister every session idle past the timeout. Protects the table
    /// from leaking entries when transport close events are lost.
    pub fn sweep_idle(&self, idle_timeout: Duration) -> usize {
        let now = chrono::Utc::now().timestamp();
        let cutoff = idle_timeout.as_secs() as i64;

        let stale: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|e| e.value().idle_seconds(now) > cutoff)
            .map(|e| e.key().clone())
            .collect();

        let count = stale.len();
        for session_id in stale {
            tracing::warn!(
                target: "offersync::registry",
                session_id = %session_id,
                "terminating idle session"
            );
            self.deregister(&session_id);
        }
        count
    }
}

/// Periodic liveness sweep, run as a background task
pub async fn run_sweeper(
    registry: Arc<ClientRegistry>,
    sweep_interval: Duration,
    idle_timeout: Duration,
) {
    let mut timer = tokio::time::interval(sweep_interval);
    timer.tick().await; // first tick completes immediately
    loop {
        timer.tick().await;
        let swept = registry.sweep_idle(idle_timeout);
        if swept > 0 {
            tracing::info!(target: "offersync::registry", swept, "liveness sweep");
        }
    }
}
