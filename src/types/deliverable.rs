//! Deliverable records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Review state of a submitted deliverable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableStatus {
    Submitted,
    Approved,
    Rejected,
}

/// Content an influencer submits against a claim
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deliverable {
    pub id: String,
    pub claim_id: String,
    pub influencer_id: String,
    pub url: String,
    pub status: DeliverableStatus,
    pub submitted_at: DateTime<Utc>,
}

impl Deliverable {
    pub fn new(
        id: impl Into<String>,
        claim_id: impl Into<String>,
        influencer_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            claim_id: claim_id.into(),
            influencer_id: influencer_id.into(),
            url: url.into(),
            status: DeliverableStatus::Submitted,
            submitted_at: Utc::now(),
        }
    }
}
