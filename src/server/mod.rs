//! Server side of the sync layer
//!
//! Sessions register in the [`registry`], domain mutations flow through the
//! [`router`] to entitled sessions, and the [`http`] module exposes the
//! WebSocket endpoint plus the request/response fallback surface.

pub mod http;
pub mod limiter;
pub mod registry;
pub mod router;
pub mod snapshot;
pub mod ws;

pub use http::{create_router, AppState};
pub use limiter::RateLimiter;
pub use registry::{ClientRegistry, SessionHandle, SessionId};
pub use router::{ChangeRouter, RouterConfig, RouterHandle};
pub use snapshot::SnapshotService;
