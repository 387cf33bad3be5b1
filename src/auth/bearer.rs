//! Bearer-token resolution backed by JWT

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::types::UserRole;

use super::{AuthError, Credentials, Identity, IdentityResolver};

/// JWT claims carried by a bearer credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Marketplace role
    pub role: UserRole,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: impl Into<String>, role: UserRole, ttl_seconds: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.into(),
            role,
            iat: now,
            exp: now + ttl_seconds,
        }
    }
}

/// Validates bearer JWTs signed by the external credential issuer
pub struct BearerResolver {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl BearerResolver {
    /// Create a resolver from the shared signing secret (min 32 chars)
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        if secret.len() < 32 {
            return Err(AuthError::InvalidSecret(
                "signing secret must be at least 32 characters".to_string(),
            ));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    /// Sign a token for the given identity.
    ///
    /// Issuance belongs to the external auth collaborator; this exists so
    /// tests and local tooling can mint credentials the resolver accepts.
    pub fn issue(&self, user_id: &str, role: UserRole, ttl_seconds: i64) -> Result<String, AuthError> {
        let claims = Claims::new(user_id, role, ttl_seconds);
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default()).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            },
        )?;

        Ok(Identity {
            user_id: data.claims.sub,
            role: data.claims.role,
        })
    }
}

impl IdentityResolver for BearerResolver {
    fn name(&self) -> &'static str {
        "bearer"
    }

    fn resolve(&self, credentials: &Credentials) -> Result<Option<Identity>, AuthError> {
        match credentials.bearer.as_deref() {
            Some(token) => self.validate(token).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-that-is-at-least-32-characters-long";

    #[test]
    fn test_secret_length_enforced() {
        assert!(matches!(
            BearerResolver::new("short"),
            Err(AuthError::InvalidSecret(_))
        ));
    }

    #[test]
    fn test_issue_and_resolve() {
        let resolver = BearerResolver::new(SECRET).unwrap();
        let token = resolver.issue("inf-1", UserRole::Influencer, 3600).unwrap();

        let creds = Credentials {
            bearer: Some(token),
            session_cookie: None,
        };
        let identity = resolver.resolve(&creds).unwrap().unwrap();
        assert_eq!(identity.user_id, "inf-1");
        assert_eq!(identity.role, UserRole::Influencer);
    }

    #[test]
    fn test_expired_token_rejected() {
        let resolver = BearerResolver::new(SECRET).unwrap();
        let token = resolver.issue("inf-1", UserRole::Influencer, -120).unwrap();

        let creds = Credentials {
            bearer: Some(token),
            session_cookie: None,
        };
        assert!(matches!(
            resolver.resolve(&creds),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let resolver = BearerResolver::new(SECRET).unwrap();
        let creds = Credentials {
            bearer: Some("not-a-jwt".to_string()),
            session_cookie: None,
        };
        assert!(matches!(
            resolver.resolve(&creds),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_absent_bearer_is_not_applicable() {
        let resolver = BearerResolver::new(SECRET).unwrap();
        assert!(resolver.resolve(&Credentials::default()).unwrap().is_none());
    }
}
