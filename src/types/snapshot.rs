//! Point-in-time, user-scoped snapshot of the domain collections

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    BusinessProfile, Claim, Deliverable, InfluencerProfile, Notification, Offer, SocialPlatform,
};

/// A full, freshly computed view of everything the server considers visible
/// to one user. Regenerated wholesale on every request, never patched.
///
/// Business and influencer snapshots have disjoint profile shapes; the
/// collections are empty rather than absent when a user has no data yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_profile: Option<BusinessProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub influencer_profile: Option<InfluencerProfile>,
    #[serde(default)]
    pub offers: Vec<Offer>,
    #[serde(default)]
    pub claims: Vec<Claim>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub social_platforms: Vec<SocialPlatform>,
    #[serde(default)]
    pub deliverables: Vec<Deliverable>,
    pub generated_at: DateTime<Utc>,
}

impl Snapshot {
    /// An otherwise-empty snapshot stamped now
    pub fn empty() -> Self {
        Self {
            business_profile: None,
            influencer_profile: None,
            offers: Vec::new(),
            claims: Vec::new(),
            notifications: Vec::new(),
            social_platforms: Vec::new(),
            deliverables: Vec::new(),
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot_serializes_collections() {
        let json = serde_json::to_value(Snapshot::empty()).unwrap();
        assert!(json["offers"].as_array().unwrap().is_empty());
        assert!(json.get("businessProfile").is_none());
        assert!(json.get("generatedAt").is_some());
    }
}
