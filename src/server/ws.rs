//! WebSocket session handler
//!
//! Identity is resolved before the upgrade; an unauthenticated attempt is
//! answered 401 and never becomes a socket. After the upgrade one task owns
//! the session: inbound frames for a session are handled strictly one at a
//! time, while routed deliveries arrive through the session's outbound
//! channel.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::protocol::{Envelope, Frame};
use crate::server::registry::SessionHandle;

use super::http::{credentials_from, AppState};

/// Query parameters for a WebSocket connection attempt
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Bearer credential as a connection parameter
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let credentials = credentials_from(&headers, params.token.as_deref());
    match state.resolvers.resolve(&credentials) {
        Ok(identity) => ws.on_upgrade(move |socket| handle_socket(socket, state, identity)),
        Err(err) => {
            tracing::warn!(target: "offersync::ws", error = %err, "connection rejected");
            (StatusCode::UNAUTHORIZED, err.to_string()).into_response()
        }
    }
}

/// Service one registered session until either side goes away
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, identity: crate::auth::Identity) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = state.registry.register(identity.user_id, identity.role, tx);

    let connected = Envelope::stamped(Frame::Connected {
        user_id: handle.user_id.clone(),
        user_type: handle.role,
    });
    if !send_envelope(&mut socket, &connected).await {
        state.registry.deregister(&handle.session_id);
        return;
    }

    loop {
        tokio::select! {
            // Routed deliveries and other queued outbound traffic
            outbound = rx.recv() => {
                match outbound {
                    // A session deregistered mid-delivery must go silent even
                    // if envelopes are still queued.
                    Some(_) if handle.is_closed() => break,
                    Some(envelope) => {
                        if !send_envelope(&mut socket, &envelope).await {
                            break;
                        }
                    }
                    None => break,
                }
            }

            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(msg)) => {
                        if !handle_inbound(msg, &mut socket, &state, &handle).await {
                            break;
                        }
                    }
                    Some(Err(_)) => break, // transport error
                    None => break,         // client disconnected
                }
            }
        }
    }

    state.registry.deregister(&handle.session_id);
}

/// Handle one raw socket message; false closes the session
async fn handle_inbound(
    msg: Message,
    socket: &mut WebSocket,
    state: &AppState,
    handle: &SessionHandle,
) -> bool {
    match msg {
        Message::Text(text) => {
            match Envelope::from_json(&text) {
                Ok(envelope) => handle_frame(envelope.frame, socket, state, handle).await,
                Err(err) => {
                    // Malformed frames never take the connection down
                    tracing::warn!(
                        target: "offersync::ws",
                        session_id = %handle.session_id,
                        error = %err,
                        "malformed frame dropped"
                    );
                    true
                }
            }
        }
        Message::Binary(_) => true, // ignore binary traffic
        Message::Ping(data) => {
            let _ = socket.send(Message::Pong(data)).await;
            true
        }
        Message::Pong(_) => true,
        Message::Close(_) => false,
    }
}

/// Handle one decoded client frame; false closes the session
async fn handle_frame(
    frame: Frame,
    socket: &mut WebSocket,
    state: &AppState,
    handle: &SessionHandle,
) -> bool {
    handle.touch();

    match frame {
        Frame::Ping => send_envelope(socket, &Envelope::stamped(Frame::Pong)).await,

        Frame::SyncRequest => {
            if !state.limiter.allow(&handle.user_id) {
                return reject_rate_limited(socket, handle).await;
            }
            match state.snapshots.compute(&handle.user_id, handle.role).await {
                Ok(snapshot) => {
                    send_envelope(socket, &Envelope::stamped(Frame::SyncResponse(snapshot))).await
                }
                Err(err) => {
                    tracing::error!(
                        target: "offersync::ws",
                        session_id = %handle.session_id,
                        error = %err,
                        "snapshot computation failed"
                    );
                    let error = Frame::Error {
                        message: "snapshot unavailable".to_string(),
                    };
                    send_envelope(socket, &Envelope::stamped(error)).await
                }
            }
        }

        Frame::Changes { changes } => {
            if !state.limiter.allow(&handle.user_id) {
                return reject_rate_limited(socket, handle).await;
            }
            let count = changes.len();
            for mut change in changes {
                // The authenticated session is authoritative for attribution
                change.originating_user_id = handle.user_id.clone();
                state.router.enqueue(change);
            }
            send_envelope(socket, &Envelope::stamped(Frame::ChangesAck { count })).await
        }

        other => {
            tracing::debug!(
                target: "offersync::ws",
                session_id = %handle.session_id,
                kind = other.kind(),
                "unexpected client frame dropped"
            );
            true
        }
    }
}

/// Answer a rate-limit violation; the session stays connected
async fn reject_rate_limited(socket: &mut WebSocket, handle: &SessionHandle) -> bool {
    tracing::warn!(
        target: "offersync::ws",
        session_id = %handle.session_id,
        user_id = %handle.user_id,
        "rate limit exceeded"
    );
    let error = Frame::Error {
        message: "rate limit exceeded".to_string(),
    };
    send_envelope(socket, &Envelope::stamped(error)).await
}

/// Serialize and send; a failed send means the transport is gone
async fn send_envelope(socket: &mut WebSocket, envelope: &Envelope) -> bool {
    match envelope.to_json() {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(err) => {
            tracing::error!(target: "offersync::ws", error = %err, "envelope serialization failed");
            true
        }
    }
}
