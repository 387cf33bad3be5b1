//! Offersync - real-time entity synchronization for the creator marketplace
//!
//! A persistent bidirectional WebSocket channel keeps every connected
//! client's local view of offers, claims, messages, notifications, and
//! deliverables consistent with server state, degrading to a plain
//! request/response fallback when the channel is unavailable.
//!
//! # Modules
//!
//! - `types`: domain records, change events, snapshots
//! - `protocol`: the wire envelope and closed frame set
//! - `auth`: identity resolution (bearer JWT and session cookie chain)
//! - `store`: storage collaborator trait plus an in-memory implementation
//! - `server`: session registry, change router, rate limiter, snapshot
//!   service, WebSocket handler, and the HTTP fallback surface
//! - `client`: connection manager, transport seam, and cache reconciler
//! - `config`: `OFFERSYNC_*` environment configuration
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use offersync::auth::{BearerResolver, ResolverChain};
//! use offersync::config::ServerConfig;
//! use offersync::server::{create_router, AppState};
//! use offersync::store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let resolvers = ResolverChain::new()
//!         .with(Arc::new(BearerResolver::new(&config.jwt_secret).unwrap()));
//!     let state = AppState::build(Arc::new(MemoryStore::new()), resolvers, &config);
//!     let app = create_router(state);
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr).await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod store;
pub mod types;

// Re-export commonly used items at crate root
pub use client::{ConnectionManager, ConnectionState, Reconciler};
pub use config::ServerConfig;
pub use error::{SyncError, SyncResult};
pub use protocol::{Envelope, Frame};
pub use server::{create_router, AppState, ChangeRouter, ClientRegistry, RateLimiter};
pub use store::{MemoryStore, SyncStore};
pub use types::{ChangeAction, EntityChange, EntityKind, Snapshot, UserRole};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
