//! Chat message records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message exchanged between the two parties of a claim
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub claim_id: String,
    pub sender_id: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        id: impl Into<String>,
        claim_id: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            claim_id: claim_id.into(),
            sender_id: sender_id.into(),
            body: body.into(),
            sent_at: Utc::now(),
        }
    }
}
