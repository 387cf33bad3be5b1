//! Client side of the sync layer
//!
//! The [`manager`] owns the push channel and its lifecycle; everything it
//! receives flows into the [`reconciler`]'s local cache. When the channel is
//! down, callers read snapshots over the request/response fallback and feed
//! them to the same reconciler.

pub mod manager;
pub mod reconciler;
pub mod transport;

pub use manager::{ConnectionManager, ConnectionState, ManagerConfig, ReconnectPolicy};
pub use reconciler::Reconciler;
pub use transport::{Connector, Transport, TransportError, WsConnector};
