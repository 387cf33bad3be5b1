//! Data types for the offersync server
//!
//! This module contains the domain records carried by snapshots, the change
//! event consumed by the router, and the role/party types shared across the
//! server and client halves of the crate.

mod change;
mod claim;
mod deliverable;
mod message;
mod notification;
mod offer;
mod profile;
mod role;
mod snapshot;

pub use change::{ChangeAction, EntityChange, EntityKind};
pub use claim::{Claim, ClaimParties, ClaimStatus};
pub use deliverable::{Deliverable, DeliverableStatus};
pub use message::ChatMessage;
pub use notification::Notification;
pub use offer::{Offer, OfferStatus};
pub use profile::{BusinessProfile, InfluencerProfile, SocialPlatform};
pub use role::UserRole;
pub use snapshot::Snapshot;
