//! In-memory storage collaborator
//!
//! Backs the server in tests and single-process deployments. Keyed maps per
//! entity family behind one `parking_lot` lock; reads clone out so no lock
//! is held across await points.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::types::{
    BusinessProfile, ChatMessage, Claim, ClaimParties, Deliverable, InfluencerProfile,
    Notification, Offer, OfferStatus, Snapshot, SocialPlatform, UserRole,
};

use super::{StoreError, SyncStore};

#[derive(Default)]
struct Tables {
    offers: HashMap<String, Offer>,
    claims: HashMap<String, Claim>,
    messages: HashMap<String, ChatMessage>,
    notifications: HashMap<String, Notification>,
    deliverables: HashMap<String, Deliverable>,
    business_profiles: HashMap<String, BusinessProfile>,
    influencer_profiles: HashMap<String, InfluencerProfile>,
    social_platforms: HashMap<String, SocialPlatform>,
}

/// In-memory implementation of [`SyncStore`]
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_offer(&self, offer: Offer) {
        self.tables.write().offers.insert(offer.id.clone(), offer);
    }

    pub fn remove_offer(&self, offer_id: &str) {
        self.tables.write().offers.remove(offer_id);
    }

    pub fn insert_claim(&self, claim: Claim) {
        self.tables.write().claims.insert(claim.id.clone(), claim);
    }

    pub fn insert_message(&self, message: ChatMessage) {
        self.tables
            .write()
            .messages
            .insert(message.id.clone(), message);
    }

    pub fn insert_notification(&self, notification: Notification) {
        self.tables
            .write()
            .notifications
            .insert(notification.id.clone(), notification);
    }

    pub fn insert_deliverable(&self, deliverable: Deliverable) {
        self.tables
            .write()
            .deliverables
            .insert(deliverable.id.clone(), deliverable);
    }

    pub fn insert_business_profile(&self, profile: BusinessProfile) {
        self.tables
            .write()
            .business_profiles
            .insert(profile.user_id.clone(), profile);
    }

    pub fn insert_influencer_profile(&self, profile: InfluencerProfile) {
        self.tables
            .write()
            .influencer_profiles
            .insert(profile.user_id.clone(), profile);
    }

    pub fn insert_social_platform(&self, platform: SocialPlatform) {
        self.tables
            .write()
            .social_platforms
            .insert(platform.id.clone(), platform);
    }

    fn business_snapshot(tables: &Tables, user_id: &str) -> Snapshot {
        let mut offers: Vec<Offer> = tables
            .offers
            .values()
            .filter(|o| o.business_id == user_id)
            .cloned()
            .collect();
        offers.sort_by(|a, b| a.id.cmp(&b.id));

        let offer_ids: HashSet<&str> = offers.iter().map(|o| o.id.as_str()).collect();

        let mut claims: Vec<Claim> = tables
            .claims
            .values()
            .filter(|c| offer_ids.contains(c.offer_id.as_str()))
            .cloned()
            .collect();
        claims.sort_by(|a, b| a.id.cmp(&b.id));

        let claim_ids: HashSet<&str> = claims.iter().map(|c| c.id.as_str()).collect();

        let mut deliverables: Vec<Deliverable> = tables
            .deliverables
            .values()
            .filter(|d| claim_ids.contains(d.claim_id.as_str()))
            .cloned()
            .collect();
        deliverables.sort_by(|a, b| a.id.cmp(&b.id));

        Snapshot {
            business_profile: tables.business_profiles.get(user_id).cloned(),
            influencer_profile: None,
            offers,
            claims,
            notifications: Self::notifications_for(tables, user_id),
            social_platforms: Vec::new(),
            deliverables,
            generated_at: Utc::now(),
        }
    }

    fn influencer_snapshot(tables: &Tables, user_id: &str) -> Snapshot {
        let mut claims: Vec<Claim> = tables
            .claims
            .values()
            .filter(|c| c.influencer_id == user_id)
            .cloned()
            .collect();
        claims.sort_by(|a, b| a.id.cmp(&b.id));

        let claimed_offer_ids: HashSet<&str> = claims.iter().map(|c| c.offer_id.as_str()).collect();

        // Open offers are visible to every influencer; closed ones only stay
        // visible through an existing claim.
        let mut offers: Vec<Offer> = tables
            .offers
            .values()
            .filter(|o| o.status == OfferStatus::Open || claimed_offer_ids.contains(o.id.as_str()))
            .cloned()
            .collect();
        offers.sort_by(|a, b| a.id.cmp(&b.id));

        let mut deliverables: Vec<Deliverable> = tables
            .deliverables
            .values()
            .filter(|d| d.influencer_id == user_id)
            .cloned()
            .collect();
        deliverables.sort_by(|a, b| a.id.cmp(&b.id));

        let mut social_platforms: Vec<SocialPlatform> = tables
            .social_platforms
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        social_platforms.sort_by(|a, b| a.id.cmp(&b.id));

        Snapshot {
            business_profile: None,
            influencer_profile: tables.influencer_profiles.get(user_id).cloned(),
            offers,
            claims,
            notifications: Self::notifications_for(tables, user_id),
            social_platforms,
            deliverables,
            generated_at: Utc::now(),
        }
    }

    fn notifications_for(tables: &Tables, user_id: &str) -> Vec<Notification> {
        let mut notifications: Vec<Notification> = tables
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| a.id.cmp(&b.id));
        notifications
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn offer_owner(&self, offer_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .tables
            .read()
            .offers
            .get(offer_id)
            .map(|o| o.business_id.clone()))
    }

    async fn claim_parties(&self, claim_id: &str) -> Result<Option<ClaimParties>, StoreError> {
        Ok(self.tables.read().claims.get(claim_id).map(Claim::parties))
    }

    async fn message_parties(&self, message_id: &str) -> Result<Option<ClaimParties>, StoreError> {
        let tables = self.tables.read();
        let claim_id = match tables.messages.get(message_id) {
            Some(message) => message.claim_id.as_str(),
            None => return Ok(None),
        };
        Ok(tables.claims.get(claim_id).map(Claim::parties))
    }

    async fn notification_recipient(
        &self,
        notification_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .tables
            .read()
            .notifications
            .get(notification_id)
            .map(|n| n.user_id.clone()))
    }

    async fn deliverable_assignee(
        &self,
        deliverable_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .tables
            .read()
            .deliverables
            .get(deliverable_id)
            .map(|d| d.influencer_id.clone()))
    }

    async fn snapshot(&self, user_id: &str, role: UserRole) -> Result<Snapshot, StoreError> {
        let tables = self.tables.read();
        Ok(match role {
            UserRole::Business => Self::business_snapshot(&tables, user_id),
            UserRole::Influencer => Self::influencer_snapshot(&tables, user_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offer_owner_lookup() {
        let store = MemoryStore::new();
        store.insert_offer(Offer::new("o1", "biz-1", "Spring campaign"));

        assert_eq!(
            store.offer_owner("o1").await.unwrap().as_deref(),
            Some("biz-1")
        );
        assert!(store.offer_owner("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_message_parties_resolve_through_claim() {
        let store = MemoryStore::new();
        store.insert_claim(Claim::new("c1", "o1", "biz-1", "inf-1"));
        store.insert_message(ChatMessage::new("m1", "c1", "inf-1", "hello"));

        let parties = store.message_parties("m1").await.unwrap().unwrap();
        assert_eq!(parties.business_id, "biz-1");
        assert_eq!(parties.influencer_id, "inf-1");

        // Orphan message: claim unknown
        store.insert_message(ChatMessage::new("m2", "c-gone", "inf-1", "hi"));
        assert!(store.message_parties("m2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_business_snapshot_scopes_claims_to_own_offers() {
        let store = MemoryStore::new();
        store.insert_offer(Offer::new("o1", "biz-1", "A"));
        store.insert_offer(Offer::new("o2", "biz-1", "B"));
        store.insert_offer(Offer::new("o3", "biz-1", "C"));
        store.insert_offer(Offer::new("o9", "biz-2", "Other"));

        store.insert_claim(Claim::new("c1", "o1", "biz-1", "inf-1"));
        store.insert_claim(Claim::new("c2", "o2", "biz-1", "inf-2"));
        store.insert_claim(Claim::new("c9", "o9", "biz-2", "inf-1"));

        let snapshot = store.snapshot("biz-1", UserRole::Business).await.unwrap();

        assert_eq!(snapshot.offers.len(), 3);
        assert_eq!(snapshot.claims.len(), 2);
        assert!(snapshot.claims.iter().all(|c| c.business_id == "biz-1"));
        assert!(snapshot.influencer_profile.is_none());
    }

    #[tokio::test]
    async fn test_influencer_snapshot_includes_open_and_claimed_offers() {
        let store = MemoryStore::new();
        let mut closed = Offer::new("o1", "biz-1", "Closed but claimed");
        closed.status = OfferStatus::Closed;
        store.insert_offer(closed);
        store.insert_offer(Offer::new("o2", "biz-1", "Open"));
        let mut closed_other = Offer::new("o3", "biz-1", "Closed, unclaimed");
        closed_other.status = OfferStatus::Closed;
        store.insert_offer(closed_other);

        store.insert_claim(Claim::new("c1", "o1", "biz-1", "inf-1"));

        let snapshot = store.snapshot("inf-1", UserRole::Influencer).await.unwrap();
        let ids: Vec<&str> = snapshot.offers.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["o1", "o2"]);
    }

    #[tokio::test]
    async fn test_snapshot_for_unknown_user_is_empty_not_error() {
        let store = MemoryStore::new();
        let snapshot = store.snapshot("ghost", UserRole::Business).await.unwrap();

        assert!(snapshot.business_profile.is_none());
        assert!(snapshot.offers.is_empty());
        assert!(snapshot.claims.is_empty());
    }
}
