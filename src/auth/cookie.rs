//! Session-cookie resolution against an in-memory token table

use std::sync::Arc;

use dashmap::DashMap;

use crate::types::UserRole;

use super::{AuthError, Credentials, Identity, IdentityResolver};

/// Server-side table of live session cookies, populated by the external
/// login flow and consulted here read-only.
#[derive(Default)]
pub struct SessionTable {
    entries: DashMap<String, Identity>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn insert(&self, cookie: impl Into<String>, user_id: impl Into<String>, role: UserRole) {
        self.entries.insert(
            cookie.into(),
            Identity {
                user_id: user_id.into(),
                role,
            },
        );
    }

    pub fn revoke(&self, cookie: &str) {
        self.entries.remove(cookie);
    }

    fn lookup(&self, cookie: &str) -> Option<Identity> {
        self.entries.get(cookie).map(|e| e.value().clone())
    }
}

/// Resolves the `session` cookie against the session table
pub struct SessionCookieResolver {
    table: Arc<SessionTable>,
}

impl SessionCookieResolver {
    pub fn new(table: Arc<SessionTable>) -> Self {
        Self { table }
    }
}

impl IdentityResolver for SessionCookieResolver {
    fn name(&self) -> &'static str {
        "session_cookie"
    }

    fn resolve(&self, credentials: &Credentials) -> Result<Option<Identity>, AuthError> {
        match credentials.session_cookie.as_deref() {
            Some(cookie) => self
                .table
                .lookup(cookie)
                .map(Some)
                .ok_or(AuthError::UnknownSession),
            None => Ok(None),
        }
    }
}
