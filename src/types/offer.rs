//! Offer records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Open,
    Closed,
}

/// A campaign offer published by a business
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: String,
    pub business_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Budget in whole currency units, if disclosed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<u64>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    /// Create an open offer with the minimum required fields
    pub fn new(id: impl Into<String>, business_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            business_id: business_id.into(),
            title: title.into(),
            description: None,
            budget: None,
            status: OfferStatus::Open,
            created_at: Utc::now(),
        }
    }
}
