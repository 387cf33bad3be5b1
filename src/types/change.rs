//! Change events propagated from domain mutations to interested sessions

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of entity families the sync layer transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Offer,
    Claim,
    Message,
    Notification,
    Deliverable,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Offer => "offer",
            EntityKind::Claim => "claim",
            EntityKind::Message => "message",
            EntityKind::Notification => "notification",
            EntityKind::Deliverable => "deliverable",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// A single create/update/delete event for one domain entity.
///
/// Produced by a domain mutation after the storage layer has applied it,
/// consumed exactly once by the change router, then discarded. The payload
/// is opaque to the sync layer; routing resolves ownership through the
/// storage collaborator, never by trusting payload contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChange {
    pub entity_type: EntityKind,
    pub action: ChangeAction,
    pub entity_id: String,
    #[serde(default)]
    pub payload: Value,
    pub originating_user_id: String,
}

impl EntityChange {
    pub fn new(
        entity_type: EntityKind,
        action: ChangeAction,
        entity_id: impl Into<String>,
        originating_user_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            action,
            entity_id: entity_id.into(),
            payload: Value::Null,
            originating_user_id: originating_user_id.into(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_wire_shape() {
        let change = EntityChange::new(EntityKind::Offer, ChangeAction::Create, "offer-1", "biz-1");
        let json = serde_json::to_value(&change).unwrap();

        assert_eq!(json["entityType"], "offer");
        assert_eq!(json["action"], "create");
        assert_eq!(json["entityId"], "offer-1");
        assert_eq!(json["originatingUserId"], "biz-1");
    }

    #[test]
    fn test_change_parses_without_payload() {
        let json = r#"{"entityType":"claim","action":"delete","entityId":"c1","originatingUserId":"u1"}"#;
        let change: EntityChange = serde_json::from_str(json).unwrap();
        assert_eq!(change.entity_type, EntityKind::Claim);
        assert_eq!(change.action, ChangeAction::Delete);
        assert!(change.payload.is_null());
    }
}
