//! Wire protocol for the push channel
//!
//! Pure data contract: the JSON envelope and the closed set of frame kinds
//! exchanged over the WebSocket. Direction rules (which side may send which
//! kind) are enforced by the handlers, not by the codec.

mod envelope;

pub use envelope::{Envelope, Frame};
