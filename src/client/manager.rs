//! Client connection manager
//!
//! Owns at most one live transport and drives the whole lifecycle on a
//! single cooperative task: dialing, heartbeat, inbound dispatch, backoff
//! reconnection, and visibility-triggered recovery. Public methods post
//! commands to the task; state is published through a watch channel.
//!
//! Reconnection is driven by transport closure events, not by missed
//! heartbeats: the periodic `ping` exists so the server can detect
//! half-open sessions, not the client.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant};

use crate::protocol::{Envelope, Frame};
use crate::types::EntityChange;

use super::reconciler::Reconciler;
use super::transport::{Connector, Transport, TransportError};

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Exponential backoff schedule for reconnection
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub growth: f64,
    /// Automatic retries after the initial failure; once exhausted the
    /// manager parks until an external trigger
    pub max_attempts: u32,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            growth: 2.0,
            max_attempts: 6,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based). Non-decreasing in the
    /// attempt number, capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.growth.max(1.0).powi(attempt.min(32) as i32);
        self.base.mul_f64(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
    /// Minimum spacing between visibility-triggered reconnect attempts,
    /// independent of the backoff counter, so a burst of foreground signals
    /// cannot storm the server
    pub visibility_min_gap: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            visibility_min_gap: Duration::from_secs(5),
        }
    }
}

enum Command {
    Connect { token: String },
    Visibility { foreground: bool },
    SendFrame(Frame),
    Shutdown,
}

/// Handle to the manager task
pub struct ConnectionManager {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Spawn the manager task. Inbound snapshots and changes flow into the
    /// given reconciler; `notification` and `error` frames are forwarded to
    /// `notices` when provided.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        reconciler: Arc<Reconciler>,
        config: ManagerConfig,
        notices: Option<mpsc::UnboundedSender<Frame>>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let worker = Worker {
            connector,
            reconciler,
            config,
            cmd_rx,
            state_tx,
            notices,
            token: None,
            attempts: 0,
            last_visibility: None,
        };
        let task = tokio::spawn(worker.run());

        Self {
            cmd_tx,
            state_rx,
            task,
        }
    }

    /// Open (or re-open) the channel with a fresh credential. Any prior
    /// transport is torn down first; the reconnect counter resets.
    pub fn connect(&self, token: impl Into<String>) {
        let _ = self.cmd_tx.send(Command::Connect {
            token: token.into(),
        });
    }

    /// Host environment signal: the client was foregrounded or backgrounded
    pub fn notify_visibility(&self, foreground: bool) {
        let _ = self.cmd_tx.send(Command::Visibility { foreground });
    }

    /// Submit client-originated changes. A silent no-op while the channel
    /// is down; callers rely on the request/response fallback then.
    pub fn send_changes(&self, changes: Vec<EntityChange>) {
        let _ = self.cmd_tx.send(Command::SendFrame(Frame::Changes { changes }));
    }

    /// Ask for a fresh snapshot over the push channel
    pub fn request_sync(&self) {
        let _ = self.cmd_tx.send(Command::SendFrame(Frame::SyncRequest));
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Cancel all timers, close any live transport, and stop the task
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        let _ = self.task.await;
    }
}

enum SessionEnd {
    Abnormal,
    Graceful,
    Redial,
    Shutdown,
}

enum CycleEnd {
    Parked,
    Shutdown,
}

enum WaitEnd {
    Elapsed,
    Preempted,
    Shutdown,
}

struct Worker {
    connector: Arc<dyn Connector>,
    reconciler: Arc<Reconciler>,
    config: ManagerConfig,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    notices: Option<mpsc::UnboundedSender<Frame>>,
    token: Option<String>,
    attempts: u32,
    last_visibility: Option<Instant>,
}

impl Worker {
    async fn run(mut self) {
        // Parked: nothing happens without an external trigger
        loop {
            let command = match self.cmd_rx.recv().await {
                Some(command) => command,
                None => break,
            };
            match command {
                Command::Connect { token } => {
                    self.token = Some(token);
                    self.attempts = 0;
                    if matches!(self.connection_cycle().await, CycleEnd::Shutdown) {
                        break;
                    }
                }
                Command::Visibility { foreground: true } => {
                    if self.token.is_some() && self.visibility_gate() {
                        self.attempts = 0;
                        if matches!(self.connection_cycle().await, CycleEnd::Shutdown) {
                            break;
                        }
                    }
                }
                Command::Visibility { foreground: false } => {}
                Command::SendFrame(frame) => {
                    tracing::warn!(
                        target: "offersync::manager",
                        kind = frame.kind(),
                        "not connected; frame dropped"
                    );
                }
                Command::Shutdown => break,
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Dial and service connections until the manager parks or shuts down
    async fn connection_cycle(&mut self) -> CycleEnd {
        loop {
            let token = match self.token.clone() {
                Some(token) => token,
                None => {
                    self.set_state(ConnectionState::Disconnected);
                    return CycleEnd::Parked;
                }
            };

            self.set_state(ConnectionState::Connecting);
            match self.connector.connect(&token).await {
                Ok(transport) => {
                    self.attempts = 0;
                    self.set_state(ConnectionState::Connected);
                    match self.connected_loop(transport).await {
                        SessionEnd::Abnormal => {} // fall through to backoff
                        SessionEnd::Redial => continue,
                        SessionEnd::Graceful => {
                            self.set_state(ConnectionState::Disconnected);
                            return CycleEnd::Parked;
                        }
                        SessionEnd::Shutdown => return CycleEnd::Shutdown,
                    }
                }
                Err(TransportError::Unauthorized) => {
                    // Retrying with the same stale credential is pointless;
                    // the caller must connect() again with a fresh identity.
                    tracing::warn!(
                        target: "offersync::manager",
                        "credential rejected; fresh identity required"
                    );
                    self.token = None;
                    self.set_state(ConnectionState::Disconnected);
                    return CycleEnd::Parked;
                }
                Err(err) => {
                    tracing::warn!(target: "offersync::manager", error = %err, "dial failed");
                }
            }

            if self.attempts >= self.config.reconnect.max_attempts {
                tracing::warn!(
                    target: "offersync::manager",
                    attempts = self.attempts,
                    "reconnect attempts exhausted; parking"
                );
                self.set_state(ConnectionState::Disconnected);
                return CycleEnd::Parked;
            }

            let delay = self.config.reconnect.delay(self.attempts);
            self.attempts += 1;
            self.set_state(ConnectionState::Reconnecting);
            tracing::info!(
                target: "offersync::manager",
                attempt = self.attempts,
                delay_ms = delay.as_millis() as u64,
                "reconnect scheduled"
            );

            match self.backoff_wait(delay).await {
                WaitEnd::Elapsed | WaitEnd::Preempted => {}
                WaitEnd::Shutdown => return CycleEnd::Shutdown,
            }
        }
    }

    /// Sleep out the backoff delay, staying responsive to commands
    async fn backoff_wait(&mut self, delay: Duration) -> WaitEnd {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return WaitEnd::Elapsed,
                command = self.cmd_rx.recv() => match command {
                    None | Some(Command::Shutdown) => return WaitEnd::Shutdown,
                    Some(Command::Connect { token }) => {
                        self.token = Some(token);
                        self.attempts = 0;
                        return WaitEnd::Preempted;
                    }
                    Some(Command::Visibility { foreground: true }) => {
                        // A foregrounded client wants instant recovery
                        if self.visibility_gate() {
                            return WaitEnd::Preempted;
                        }
                    }
                    Some(Command::Visibility { foreground: false }) => {}
                    Some(Command::SendFrame(frame)) => {
                        tracing::warn!(
                            target: "offersync::manager",
                            kind = frame.kind(),
                            "not connected; frame dropped"
                        );
                    }
                }
            }
        }
    }

    /// Service one live transport until it ends
    async fn connected_loop(&mut self, mut transport: Box<dyn Transport>) -> SessionEnd {
        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.tick().await; // the first tick completes immediately

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if self.send(&mut transport, Frame::Ping).await.is_err() {
                        return SessionEnd::Abnormal;
                    }
                }

                command = self.cmd_rx.recv() => match command {
                    None | Some(Command::Shutdown) => {
                        // Timers die with this loop; close the transport last
                        transport.close().await;
                        return SessionEnd::Shutdown;
                    }
                    Some(Command::Connect { token }) => {
                        // At most one live transport per manager: tear down
                        // the old one before dialing with the new credential.
                        transport.close().await;
                        self.token = Some(token);
                        self.attempts = 0;
                        return SessionEnd::Redial;
                    }
                    Some(Command::Visibility { .. }) => {}
                    Some(Command::SendFrame(frame)) => {
                        if self.send(&mut transport, frame).await.is_err() {
                            return SessionEnd::Abnormal;
                        }
                    }
                },

                inbound = transport.recv_text() => match inbound {
                    Ok(Some(text)) => {
                        if let Some(reply) = self.dispatch(&text) {
                            if self.send(&mut transport, reply).await.is_err() {
                                return SessionEnd::Abnormal;
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::info!(target: "offersync::manager", "server closed the channel");
                        return SessionEnd::Graceful;
                    }
                    Err(err) => {
                        tracing::warn!(target: "offersync::manager", error = %err, "transport failure");
                        return SessionEnd::Abnormal;
                    }
                }
            }
        }
    }

    /// Handle one inbound frame; may produce an immediate reply
    fn dispatch(&mut self, text: &str) -> Option<Frame> {
        let envelope = match Envelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(target: "offersync::manager", error = %err, "malformed frame dropped");
                return None;
            }
        };

        match envelope.frame {
            Frame::Connected { user_id, user_type } => {
                tracing::info!(
                    target: "offersync::manager",
                    user_id = %user_id,
                    role = %user_type,
                    "registered with server"
                );
                // Seed the local cache right away
                Some(Frame::SyncRequest)
            }
            Frame::SyncResponse(snapshot) => {
                self.reconciler.apply_snapshot(&snapshot);
                None
            }
            Frame::Update(change) => {
                self.reconciler.apply_change(&change);
                None
            }
            Frame::Pong => None,
            Frame::ChangesAck { count } => {
                tracing::debug!(target: "offersync::manager", count, "changes acknowledged");
                None
            }
            frame @ (Frame::Notification(_) | Frame::Error { .. }) => {
                if let Some(notices) = &self.notices {
                    let _ = notices.send(frame);
                }
                None
            }
            other => {
                tracing::debug!(
                    target: "offersync::manager",
                    kind = other.kind(),
                    "unexpected server frame dropped"
                );
                None
            }
        }
    }

    async fn send(
        &self,
        transport: &mut Box<dyn Transport>,
        frame: Frame,
    ) -> Result<(), TransportError> {
        let json = Envelope::stamped(frame)
            .to_json()
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        transport.send_text(&json).await
    }

    /// Rate-limit visibility-triggered reconnects independently of backoff
    fn visibility_gate(&mut self) -> bool {
        let now = Instant::now();
        if let Some(previous) = self.last_visibility {
            if now.duration_since(previous) < self.config.visibility_min_gap {
                tracing::debug!(target: "offersync::manager", "visibility reconnect throttled");
                return false;
            }
        }
        self.last_visibility = Some(now);
        true
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::types::{ChangeAction, EntityKind, Offer, Snapshot, UserRole};

    enum ServerEvent {
        Text(String),
        Graceful,
        Abnormal,
    }

    enum DialOutcome {
        Fail,
        Unauthorized,
        Session {
            events: mpsc::UnboundedReceiver<ServerEvent>,
            sent: mpsc::UnboundedSender<String>,
        },
    }

    struct ScriptedConnector {
        script: Mutex<VecDeque<DialOutcome>>,
        dials: AtomicUsize,
    }

    impl ScriptedConnector {
        fn new(script: Vec<DialOutcome>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                dials: AtomicUsize::new(0),
            })
        }

        fn dials(&self) -> usize {
            self.dials.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, _token: &str) -> Result<Box<dyn Transport>, TransportError> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().unwrap().pop_front() {
                Some(DialOutcome::Session { events, sent }) => {
                    Ok(Box::new(MockTransport { events, sent }))
                }
                Some(DialOutcome::Unauthorized) => Err(TransportError::Unauthorized),
                Some(DialOutcome::Fail) | None => {
                    Err(TransportError::Failed("dial refused".to_string()))
                }
            }
        }
    }

    struct MockTransport {
        events: mpsc::UnboundedReceiver<ServerEvent>,
        sent: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
            let _ = self.sent.send(text.to_string());
            Ok(())
        }

        async fn recv_text(&mut self) -> Result<Option<String>, TransportError> {
            match self.events.recv().await {
                Some(ServerEvent::Text(text)) => Ok(Some(text)),
                Some(ServerEvent::Graceful) => Ok(None),
                Some(ServerEvent::Abnormal) => {
                    Err(TransportError::Failed("connection reset".to_string()))
                }
                // Script exhausted: hold the connection open
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {}
    }

    struct Session {
        events: mpsc::UnboundedSender<ServerEvent>,
        sent: mpsc::UnboundedReceiver<String>,
    }

    fn session() -> (DialOutcome, Session) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        (
            DialOutcome::Session {
                events: events_rx,
                sent: sent_tx,
            },
            Session {
                events: events_tx,
                sent: sent_rx,
            },
        )
    }

    fn fast_config(max_attempts: u32) -> ManagerConfig {
        ManagerConfig {
            heartbeat_interval: Duration::from_secs(30),
            reconnect: ReconnectPolicy {
                base: Duration::from_millis(10),
                growth: 2.0,
                max_attempts,
                max_delay: Duration::from_secs(1),
            },
            visibility_min_gap: Duration::from_secs(5),
        }
    }

    async fn wait_for_state(
        rx: &mut watch::Receiver<ConnectionState>,
        expected: ConnectionState,
    ) {
        tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|s| *s == expected))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
    }

    async fn next_sent(session: &mut Session) -> Envelope {
        let text = tokio::time::timeout(Duration::from_secs(30), session.sent.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("transport dropped");
        Envelope::from_json(&text).unwrap()
    }

    fn server_frame(frame: Frame) -> ServerEvent {
        ServerEvent::Text(Envelope::stamped(frame).to_json().unwrap())
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        let policy = ReconnectPolicy {
            base: Duration::from_secs(1),
            growth: 2.0,
            max_attempts: 6,
            max_delay: Duration::from_secs(60),
        };

        let mut previous = Duration::ZERO;
        for attempt in 0..12 {
            let delay = policy.delay(attempt);
            assert!(delay >= previous, "delay shrank at attempt {}", attempt);
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(10), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_registers_and_requests_sync() {
        let (outcome, mut session) = session();
        let connector = ScriptedConnector::new(vec![outcome]);
        let reconciler = Arc::new(Reconciler::new());
        let manager = ConnectionManager::spawn(
            connector.clone(),
            reconciler.clone(),
            fast_config(3),
            None,
        );
        let mut state = manager.watch_state();

        manager.connect("token-1");
        wait_for_state(&mut state, ConnectionState::Connected).await;

        session
            .events
            .send(server_frame(Frame::Connected {
                user_id: "inf-1".to_string(),
                user_type: UserRole::Influencer,
            }))
            .unwrap();

        // Registration is answered with an immediate snapshot request
        let request = next_sent(&mut session).await;
        assert!(matches!(request.frame, Frame::SyncRequest));

        let mut snapshot = Snapshot::empty();
        snapshot.offers.push(Offer::new("o1", "biz-1", "A"));
        session
            .events
            .send(server_frame(Frame::SyncResponse(snapshot)))
            .unwrap();
        session
            .events
            .send(server_frame(Frame::Update(
                EntityChange::new(EntityKind::Offer, ChangeAction::Create, "o2", "biz-1")
                    .with_payload(json!({ "id": "o2" })),
            )))
            .unwrap();

        // Reconciliation is driven by the manager's dispatch
        tokio::time::timeout(Duration::from_secs(5), async {
            while reconciler.len(EntityKind::Offer) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("reconciler never saw both offers");

        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_abnormal_close_reconnects() {
        let (first, session_a) = session();
        let (second, _session_b) = session();
        let connector = ScriptedConnector::new(vec![first, second]);
        let manager = ConnectionManager::spawn(
            connector.clone(),
            Arc::new(Reconciler::new()),
            fast_config(3),
            None,
        );
        let mut state = manager.watch_state();

        manager.connect("token-1");
        wait_for_state(&mut state, ConnectionState::Connected).await;

        session_a.events.send(ServerEvent::Abnormal).unwrap();
        wait_for_state(&mut state, ConnectionState::Connected).await;
        assert_eq!(connector.dials(), 2);

        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_exhausted_parks_disconnected() {
        let connector = ScriptedConnector::new(vec![]);
        let manager = ConnectionManager::spawn(
            connector.clone(),
            Arc::new(Reconciler::new()),
            fast_config(3),
            None,
        );
        let mut state = manager.watch_state();

        manager.connect("token-1");

        // Initial dial plus three retries, then parked
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                state.changed().await.unwrap();
                if *state.borrow() == ConnectionState::Disconnected {
                    break;
                }
            }
        })
        .await
        .expect("never parked");
        assert_eq!(connector.dials(), 4);

        // Parked means parked: no further dials without a trigger
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.dials(), 4);

        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_visibility_recovers_parked_manager() {
        let (outcome, _session) = session();
        let connector = ScriptedConnector::new(vec![DialOutcome::Fail, outcome]);
        let manager = ConnectionManager::spawn(
            connector.clone(),
            Arc::new(Reconciler::new()),
            fast_config(0),
            None,
        );
        let mut state = manager.watch_state();

        // max_attempts = 0: parks after the first failed dial
        manager.connect("token-1");
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                state.changed().await.unwrap();
                if *state.borrow() == ConnectionState::Disconnected {
                    break;
                }
            }
        })
        .await
        .expect("never parked");
        assert_eq!(connector.dials(), 1);

        // Foregrounding retries immediately, bypassing backoff
        manager.notify_visibility(true);
        wait_for_state(&mut state, ConnectionState::Connected).await;
        assert_eq!(connector.dials(), 2);

        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_visibility_retries_are_throttled() {
        let connector = ScriptedConnector::new(vec![]);
        let manager = ConnectionManager::spawn(
            connector.clone(),
            Arc::new(Reconciler::new()),
            fast_config(0),
            None,
        );
        let mut state = manager.watch_state();

        manager.connect("token-1");
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                state.changed().await.unwrap();
                if *state.borrow() == ConnectionState::Disconnected {
                    break;
                }
            }
        })
        .await
        .expect("never parked");
        assert_eq!(connector.dials(), 1);

        manager.notify_visibility(true);
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                state.changed().await.unwrap();
                if *state.borrow() == ConnectionState::Disconnected {
                    break;
                }
            }
        })
        .await
        .expect("never parked after visibility dial");
        assert_eq!(connector.dials(), 2);

        // Second signal inside the minimum gap is ignored
        manager.notify_visibility(true);
        tokio::task::yield_now().await;
        assert_eq!(connector.dials(), 2);

        // After the gap passes, the signal works again
        tokio::time::sleep(Duration::from_secs(6)).await;
        manager.notify_visibility(true);
        tokio::time::timeout(Duration::from_secs(30), async {
            while connector.dials() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("gated visibility never retried");

        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_disconnected_is_silent_noop() {
        let connector = ScriptedConnector::new(vec![]);
        let manager = ConnectionManager::spawn(
            connector.clone(),
            Arc::new(Reconciler::new()),
            fast_config(3),
            None,
        );

        manager.send_changes(vec![EntityChange::new(
            EntityKind::Offer,
            ChangeAction::Create,
            "o1",
            "u1",
        )]);
        tokio::task::yield_now().await;

        assert_eq!(connector.dials(), 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_reconnect() {
        let connector = ScriptedConnector::new(vec![]);
        let manager = ConnectionManager::spawn(
            connector.clone(),
            Arc::new(Reconciler::new()),
            ManagerConfig {
                reconnect: ReconnectPolicy {
                    base: Duration::from_secs(600),
                    growth: 2.0,
                    max_attempts: 5,
                    max_delay: Duration::from_secs(3600),
                },
                ..ManagerConfig::default()
            },
            None,
        );

        manager.connect("token-1");
        manager.shutdown().await;

        // The pending reconnect timer died with the manager
        assert!(connector.dials() <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_close_parks_without_redial() {
        let (outcome, session_a) = session();
        let connector = ScriptedConnector::new(vec![outcome]);
        let manager = ConnectionManager::spawn(
            connector.clone(),
            Arc::new(Reconciler::new()),
            fast_config(3),
            None,
        );
        let mut state = manager.watch_state();

        manager.connect("token-1");
        wait_for_state(&mut state, ConnectionState::Connected).await;

        session_a.events.send(ServerEvent::Graceful).unwrap();
        wait_for_state(&mut state, ConnectionState::Disconnected).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.dials(), 1);

        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_requires_fresh_credential() {
        let (outcome, _session) = session();
        let connector = ScriptedConnector::new(vec![DialOutcome::Unauthorized, outcome]);
        let manager = ConnectionManager::spawn(
            connector.clone(),
            Arc::new(Reconciler::new()),
            fast_config(3),
            None,
        );
        let mut state = manager.watch_state();

        manager.connect("stale-token");
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                state.changed().await.unwrap();
                if *state.borrow() == ConnectionState::Disconnected {
                    break;
                }
            }
        })
        .await
        .expect("never parked");
        assert_eq!(connector.dials(), 1);

        // The stale credential is gone: visibility cannot revive the session
        manager.notify_visibility(true);
        tokio::task::yield_now().await;
        assert_eq!(connector.dials(), 1);

        // A refreshed identity can
        manager.connect("fresh-token");
        wait_for_state(&mut state, ConnectionState::Connected).await;
        assert_eq!(connector.dials(), 2);

        manager.shutdown().await;
    }
}
