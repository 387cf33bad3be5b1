//! The message envelope and frame kinds

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{EntityChange, Snapshot, UserRole};

/// The closed set of message kinds.
///
/// Serialized as `{"type": <kind>, "data": <payload>}`; kinds without a
/// payload omit `data` entirely. Unknown kinds fail deserialization and are
/// dropped by the receiving side without closing the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Frame {
    /// Sent once by the server immediately after successful registration
    #[serde(rename_all = "camelCase")]
    Connected { user_id: String, user_type: UserRole },

    /// Client liveness probe; the server regards the session alive on receipt
    Ping,

    /// Server reply to `ping`
    Pong,

    /// Client request for a full snapshot
    SyncRequest,

    /// Full-state payload answering a `sync_request`
    SyncResponse(Snapshot),

    /// Client-originated mutations to broadcast
    Changes { changes: Vec<EntityChange> },

    /// Acknowledges receipt of a `changes` batch
    ChangesAck { count: usize },

    /// A routed, single-entity change
    Update(EntityChange),

    /// Out-of-band user notice
    Notification(Value),

    /// Protocol or authorization failure
    Error { message: String },
}

impl Frame {
    /// Stable kind name, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Connected { .. } => "connected",
            Frame::Ping => "ping",
            Frame::Pong => "pong",
            Frame::SyncRequest => "sync_request",
            Frame::SyncResponse(_) => "sync_response",
            Frame::Changes { .. } => "changes",
            Frame::ChangesAck { .. } => "changes_ack",
            Frame::Update(_) => "update",
            Frame::Notification(_) => "notification",
            Frame::Error { .. } => "error",
        }
    }
}

/// Wire envelope: a frame plus an optional ISO-8601 timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub frame: Frame,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Wrap a frame without a timestamp
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            timestamp: None,
        }
    }

    /// Wrap a frame stamped with the current time
    pub fn stamped(frame: Frame) -> Self {
        Self {
            frame,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl From<Frame> for Envelope {
    fn from(frame: Frame) -> Self {
        Envelope::new(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeAction, EntityKind};

    #[test]
    fn test_ping_wire_shape() {
        let json = Envelope::new(Frame::Ping).to_json().unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_connected_wire_shape() {
        let env = Envelope::new(Frame::Connected {
            user_id: "u1".to_string(),
            user_type: UserRole::Influencer,
        });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["data"]["userId"], "u1");
        assert_eq!(json["data"]["userType"], "influencer");
    }

    #[test]
    fn test_update_round_trip() {
        let change = EntityChange::new(EntityKind::Offer, ChangeAction::Update, "o1", "b1");
        let env = Envelope::stamped(Frame::Update(change));
        let parsed = Envelope::from_json(&env.to_json().unwrap()).unwrap();

        assert!(parsed.timestamp.is_some());
        match parsed.frame {
            Frame::Update(c) => assert_eq!(c.entity_id, "o1"),
            other => panic!("unexpected frame: {}", other.kind()),
        }
    }

    #[test]
    fn test_changes_ack_wire_shape() {
        let json = serde_json::to_value(Envelope::new(Frame::ChangesAck { count: 3 })).unwrap();
        assert_eq!(json["type"], "changes_ack");
        assert_eq!(json["data"]["count"], 3);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(Envelope::from_json(r#"{"type":"resync_all"}"#).is_err());
        assert!(Envelope::from_json("not json").is_err());
    }

    #[test]
    fn test_sync_request_parses() {
        let env = Envelope::from_json(r#"{"type":"sync_request"}"#).unwrap();
        assert!(matches!(env.frame, Frame::SyncRequest));
    }
}
