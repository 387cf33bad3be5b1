//! Top-level error type for the offersync crate

use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Errors surfaced by server construction and the binary entry point.
///
/// Recoverable conditions (transport drops, malformed frames, routing lookup
/// misses) are handled locally by the component that sees them and never
/// bubble up here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
