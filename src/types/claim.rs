//! Claim records
//!
//! A claim binds one influencer to one offer. Routing for `message` and
//! `deliverable` changes resolves through the parent claim to find both
//! parties.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Accepted,
    Completed,
    Rejected,
}

/// An influencer's claim on an offer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: String,
    pub offer_id: String,
    pub business_id: String,
    pub influencer_id: String,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
}

impl Claim {
    pub fn new(
        id: impl Into<String>,
        offer_id: impl Into<String>,
        business_id: impl Into<String>,
        influencer_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            offer_id: offer_id.into(),
            business_id: business_id.into(),
            influencer_id: influencer_id.into(),
            status: ClaimStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn parties(&self) -> ClaimParties {
        ClaimParties {
            business_id: self.business_id.clone(),
            influencer_id: self.influencer_id.clone(),
        }
    }
}

/// The two user ids tied together by a claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimParties {
    pub business_id: String,
    pub influencer_id: String,
}
