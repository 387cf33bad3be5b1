//! Client-side cache reconciliation
//!
//! Merges snapshots and incremental changes into the local view. The cache
//! keys every collection by entity id and remembers deletions, so a stale
//! `update` replayed from the HTTP fallback can never resurrect an entity
//! the push channel already deleted.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde_json::Value;

use crate::types::{ChangeAction, EntityChange, EntityKind, Snapshot};

#[derive(Default)]
struct Cache {
    business_profile: Option<Value>,
    influencer_profile: Option<Value>,
    social_platforms: HashMap<String, Value>,
    collections: HashMap<EntityKind, HashMap<String, Value>>,
    tombstones: HashMap<EntityKind, HashSet<String>>,
}

/// Local object cache fed by both transports
#[derive(Default)]
pub struct Reconciler {
    cache: RwLock<Cache>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every snapshot-carried collection wholesale.
    ///
    /// The snapshot is authoritative: tombstones for the replaced kinds are
    /// cleared, so an entity deleted and later legitimately recreated
    /// reappears. Message history is not part of snapshots and is left
    /// untouched.
    pub fn apply_snapshot(&self, snapshot: &Snapshot) {
        let mut cache = self.cache.write();

        cache.business_profile = snapshot
            .business_profile
            .as_ref()
            .and_then(|p| serde_json::to_value(p).ok());
        cache.influencer_profile = snapshot
            .influencer_profile
            .as_ref()
            .and_then(|p| serde_json::to_value(p).ok());

        cache.social_platforms = snapshot
            .social_platforms
            .iter()
            .filter_map(|p| Some((p.id.clone(), serde_json::to_value(p).ok()?)))
            .collect();

        replace_collection(&mut cache, EntityKind::Offer, &snapshot.offers, |o| &o.id);
        replace_collection(&mut cache, EntityKind::Claim, &snapshot.claims, |c| &c.id);
        replace_collection(&mut cache, EntityKind::Notification, &snapshot.notifications, |n| {
            &n.id
        });
        replace_collection(&mut cache, EntityKind::Deliverable, &snapshot.deliverables, |d| {
            &d.id
        });

        tracing::debug!(
            target: "offersync::reconciler",
            offers = snapshot.offers.len(),
            claims = snapshot.claims.len(),
            "snapshot applied"
        );
    }

    /// Fold one incremental change into the cache.
    ///
    /// Safe against duplicate delivery from overlapping transports: `create`
    /// is idempotent, `update` of an unknown id behaves as a create, and
    /// `delete` of an unknown id is a no-op.
    pub fn apply_change(&self, change: &EntityChange) {
        let mut guard = self.cache.write();
        let cache = &mut *guard;
        let kind = change.entity_type;

        match change.action {
            ChangeAction::Create | ChangeAction::Update => {
                let tombstoned = cache
                    .tombstones
                    .get(&kind)
                    .is_some_and(|t| t.contains(&change.entity_id));
                if tombstoned {
                    tracing::debug!(
                        target: "offersync::reconciler",
                        entity_type = %kind,
                        entity_id = %change.entity_id,
                        "stale change for deleted entity dropped"
                    );
                    return;
                }
                let collection = cache.collections.entry(kind).or_default();
                if change.action == ChangeAction::Create {
                    collection
                        .entry(change.entity_id.clone())
                        .or_insert_with(|| change.payload.clone());
                } else {
                    collection.insert(change.entity_id.clone(), change.payload.clone());
                }
            }
            ChangeAction::Delete => {
                cache
                    .collections
                    .entry(kind)
                    .or_default()
                    .remove(&change.entity_id);
                cache
                    .tombstones
                    .entry(kind)
                    .or_default()
                    .insert(change.entity_id.clone());
            }
        }
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.cache
            .read()
            .collections
            .get(&kind)
            .map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, kind: EntityKind) -> bool {
        self.len(kind) == 0
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.cache
            .read()
            .collections
            .get(&kind)
            .is_some_and(|c| c.contains_key(id))
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<Value> {
        self.cache
            .read()
            .collections
            .get(&kind)
            .and_then(|c| c.get(id).cloned())
    }

    pub fn business_profile(&self) -> Option<Value> {
        self.cache.read().business_profile.clone()
    }

    pub fn influencer_profile(&self) -> Option<Value> {
        self.cache.read().influencer_profile.clone()
    }

    pub fn social_platform_count(&self) -> usize {
        self.cache.read().social_platforms.len()
    }
}

fn replace_collection<T: serde::Serialize>(
    cache: &mut Cache,
    kind: EntityKind,
    items: &[T],
    id_of: impl Fn(&T) -> &String,
) {
    let map = items
        .iter()
        .filter_map(|item| Some((id_of(item).clone(), serde_json::to_value(item).ok()?)))
        .collect();
    cache.collections.insert(kind, map);
    cache.tombstones.remove(&kind);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Offer;
    use serde_json::json;

    fn create(kind: EntityKind, id: &str) -> EntityChange {
        EntityChange::new(kind, ChangeAction::Create, id, "origin")
            .with_payload(json!({ "id": id }))
    }

    fn update(kind: EntityKind, id: &str, payload: Value) -> EntityChange {
        EntityChange::new(kind, ChangeAction::Update, id, "origin").with_payload(payload)
    }

    fn delete(kind: EntityKind, id: &str) -> EntityChange {
        EntityChange::new(kind, ChangeAction::Delete, id, "origin")
    }

    #[test]
    fn test_create_is_idempotent() {
        let reconciler = Reconciler::new();
        let change = create(EntityKind::Offer, "o1");

        reconciler.apply_change(&change);
        reconciler.apply_change(&change);

        assert_eq!(reconciler.len(EntityKind::Offer), 1);
    }

    #[test]
    fn test_duplicate_create_keeps_first_payload() {
        let reconciler = Reconciler::new();
        reconciler.apply_change(&create(EntityKind::Offer, "o1"));

        let replay = EntityChange::new(EntityKind::Offer, ChangeAction::Create, "o1", "origin")
            .with_payload(json!({ "id": "o1", "stale": true }));
        reconciler.apply_change(&replay);

        assert!(reconciler.get(EntityKind::Offer, "o1").unwrap()["stale"].is_null());
    }

    #[test]
    fn test_update_replaces_or_creates() {
        let reconciler = Reconciler::new();

        // Unknown id: treated as create
        reconciler.apply_change(&update(EntityKind::Claim, "c1", json!({ "id": "c1", "v": 1 })));
        assert_eq!(reconciler.len(EntityKind::Claim), 1);

        reconciler.apply_change(&update(EntityKind::Claim, "c1", json!({ "id": "c1", "v": 2 })));
        assert_eq!(reconciler.get(EntityKind::Claim, "c1").unwrap()["v"], 2);
        assert_eq!(reconciler.len(EntityKind::Claim), 1);
    }

    #[test]
    fn test_delete_dominates_stale_replays() {
        let reconciler = Reconciler::new();
        reconciler.apply_change(&create(EntityKind::Offer, "o1"));
        reconciler.apply_change(&delete(EntityKind::Offer, "o1"));

        // Stale update racing in from the HTTP fallback must not resurrect
        reconciler.apply_change(&update(EntityKind::Offer, "o1", json!({ "id": "o1" })));
        assert!(!reconciler.contains(EntityKind::Offer, "o1"));

        // Neither may a replayed create
        reconciler.apply_change(&create(EntityKind::Offer, "o1"));
        assert!(!reconciler.contains(EntityKind::Offer, "o1"));
    }

    #[test]
    fn test_delete_of_unknown_id_is_noop() {
        let reconciler = Reconciler::new();
        reconciler.apply_change(&delete(EntityKind::Deliverable, "d1"));
        assert_eq!(reconciler.len(EntityKind::Deliverable), 0);
    }

    #[test]
    fn test_change_for_unseen_kind_initializes_collection() {
        let reconciler = Reconciler::new();
        reconciler.apply_change(&create(EntityKind::Message, "m1"));
        assert!(reconciler.contains(EntityKind::Message, "m1"));
    }

    #[test]
    fn test_snapshot_replaces_wholesale() {
        let reconciler = Reconciler::new();
        reconciler.apply_change(&create(EntityKind::Offer, "stale-offer"));

        let mut snapshot = Snapshot::empty();
        snapshot.offers.push(Offer::new("o1", "biz-1", "A"));
        snapshot.offers.push(Offer::new("o2", "biz-1", "B"));
        reconciler.apply_snapshot(&snapshot);

        assert_eq!(reconciler.len(EntityKind::Offer), 2);
        assert!(!reconciler.contains(EntityKind::Offer, "stale-offer"));
    }

    #[test]
    fn test_snapshot_clears_tombstones() {
        let reconciler = Reconciler::new();
        reconciler.apply_change(&create(EntityKind::Offer, "o1"));
        reconciler.apply_change(&delete(EntityKind::Offer, "o1"));

        // The server says the entity exists again: believe it
        let mut snapshot = Snapshot::empty();
        snapshot.offers.push(Offer::new("o1", "biz-1", "A"));
        reconciler.apply_snapshot(&snapshot);

        assert!(reconciler.contains(EntityKind::Offer, "o1"));
    }

    #[test]
    fn test_snapshot_carries_profiles_and_platforms() {
        let reconciler = Reconciler::new();
        let mut snapshot = Snapshot::empty();
        snapshot.influencer_profile = Some(crate::types::InfluencerProfile {
            user_id: "inf-1".to_string(),
            display_name: "Creator".to_string(),
            bio: None,
        });
        snapshot.social_platforms.push(crate::types::SocialPlatform {
            id: "sp1".to_string(),
            user_id: "inf-1".to_string(),
            platform: "youtube".to_string(),
            handle: "@creator".to_string(),
            followers: 1000,
        });
        reconciler.apply_snapshot(&snapshot);

        assert!(reconciler.influencer_profile().is_some());
        assert!(reconciler.business_profile().is_none());
        assert_eq!(reconciler.social_platform_count(), 1);
    }
}
