//! Identity resolution for incoming connections
//!
//! Credential issuance lives outside this crate; everything here validates
//! credentials the external collaborator already handed out. Two strategies
//! exist in production, a bearer JWT and a session cookie, tried by an
//! explicit prioritized [`ResolverChain`]. Each resolver returns a typed
//! result: resolved identity, "my credential kind is absent" (the chain
//! moves on), or a rejection reason (fatal for the whole attempt, since a
//! present-but-invalid credential must not silently fall through to a
//! weaker strategy).

mod bearer;
mod cookie;

pub use bearer::{BearerResolver, Claims};
pub use cookie::{SessionCookieResolver, SessionTable};

use std::sync::Arc;

use thiserror::Error;

use crate::types::UserRole;

/// A validated user identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: UserRole,
}

/// Why a connection attempt was rejected
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("no recognized credential presented")]
    MissingCredentials,

    #[error("invalid bearer token: {0}")]
    InvalidToken(String),

    #[error("bearer token expired")]
    TokenExpired,

    #[error("unknown or revoked session cookie")]
    UnknownSession,

    #[error("invalid signing secret: {0}")]
    InvalidSecret(String),
}

/// Credentials extracted from a connection attempt.
///
/// The transport layer (HTTP headers, WebSocket query string) is parsed once
/// into this shape so resolvers stay framework-free.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub bearer: Option<String>,
    pub session_cookie: Option<String>,
}

impl Credentials {
    /// Build from raw header values and the `token` connection parameter.
    ///
    /// The `Authorization` header wins over the query parameter when both
    /// carry a bearer token.
    pub fn from_parts(
        authorization: Option<&str>,
        cookie_header: Option<&str>,
        query_token: Option<&str>,
    ) -> Self {
        let bearer = authorization
            .map(|h| h.strip_prefix("Bearer ").unwrap_or(h).to_string())
            .or_else(|| query_token.map(str::to_string));

        let session_cookie = cookie_header.and_then(parse_session_cookie);

        Self {
            bearer,
            session_cookie,
        }
    }
}

/// Pull the `session` cookie value out of a raw `Cookie` header
fn parse_session_cookie(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "session" && !value.is_empty()).then(|| value.to_string())
    })
}

/// One credential-validation strategy
pub trait IdentityResolver: Send + Sync {
    /// Strategy name, for logging
    fn name(&self) -> &'static str;

    /// `Ok(None)` when this resolver's credential kind is absent from the
    /// request; `Err` when it is present but does not validate.
    fn resolve(&self, credentials: &Credentials) -> Result<Option<Identity>, AuthError>;
}

/// Prioritized chain of resolvers
#[derive(Clone, Default)]
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn IdentityResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    pub fn with(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Try each resolver in order. The first resolved identity wins; a typed
    /// rejection stops the chain immediately.
    pub fn resolve(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        for resolver in &self.resolvers {
            match resolver.resolve(credentials) {
                Ok(Some(identity)) => {
                    tracing::debug!(
                        target: "offersync::auth",
                        strategy = resolver.name(),
                        user_id = %identity.user_id,
                        "identity resolved"
                    );
                    return Ok(identity);
                }
                Ok(None) => continue,
                Err(err) => {
                    tracing::debug!(
                        target: "offersync::auth",
                        strategy = resolver.name(),
                        error = %err,
                        "credential rejected"
                    );
                    return Err(err);
                }
            }
        }
        Err(AuthError::MissingCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver(Option<Identity>);

    impl IdentityResolver for FixedResolver {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn resolve(&self, _credentials: &Credentials) -> Result<Option<Identity>, AuthError> {
            Ok(self.0.clone())
        }
    }

    struct RejectingResolver;

    impl IdentityResolver for RejectingResolver {
        fn name(&self) -> &'static str {
            "rejecting"
        }

        fn resolve(&self, _credentials: &Credentials) -> Result<Option<Identity>, AuthError> {
            Err(AuthError::UnknownSession)
        }
    }

    fn identity(user: &str) -> Identity {
        Identity {
            user_id: user.to_string(),
            role: UserRole::Business,
        }
    }

    #[test]
    fn test_chain_first_match_wins() {
        let chain = ResolverChain::new()
            .with(Arc::new(FixedResolver(Some(identity("first")))))
            .with(Arc::new(FixedResolver(Some(identity("second")))));

        let resolved = chain.resolve(&Credentials::default()).unwrap();
        assert_eq!(resolved.user_id, "first");
    }

    #[test]
    fn test_chain_skips_inapplicable_resolver() {
        let chain = ResolverChain::new()
            .with(Arc::new(FixedResolver(None)))
            .with(Arc::new(FixedResolver(Some(identity("fallback")))));

        let resolved = chain.resolve(&Credentials::default()).unwrap();
        assert_eq!(resolved.user_id, "fallback");
    }

    #[test]
    fn test_rejection_stops_chain() {
        let chain = ResolverChain::new()
            .with(Arc::new(RejectingResolver))
            .with(Arc::new(FixedResolver(Some(identity("never")))));

        assert!(matches!(
            chain.resolve(&Credentials::default()),
            Err(AuthError::UnknownSession)
        ));
    }

    #[test]
    fn test_empty_chain_is_missing_credentials() {
        let chain = ResolverChain::new();
        assert!(matches!(
            chain.resolve(&Credentials::default()),
            Err(AuthError::MissingCredentials)
        ));
    }

    #[test]
    fn test_credentials_prefer_header_over_query() {
        let creds = Credentials::from_parts(Some("Bearer abc"), None, Some("xyz"));
        assert_eq!(creds.bearer.as_deref(), Some("abc"));

        let creds = Credentials::from_parts(None, None, Some("xyz"));
        assert_eq!(creds.bearer.as_deref(), Some("xyz"));
    }

    #[test]
    fn test_session_cookie_parsing() {
        let creds = Credentials::from_parts(None, Some("theme=dark; session=s-123; lang=en"), None);
        assert_eq!(creds.session_cookie.as_deref(), Some("s-123"));

        let creds = Credentials::from_parts(None, Some("theme=dark"), None);
        assert!(creds.session_cookie.is_none());
    }
}
