//! JWT-based identity resolution.
//!
//! Tokens are issued by the external auth collaborator and verified here
//! with RS256 (RSA-SHA256). This service never issues tokens; it only
//! resolves an opaque credential to a client identity and tenant scope.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error type for identity resolution.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Claims carried by an access token.
///
/// A missing `tenant_id` marks a superuser credential that may observe
/// every tenant's traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (client identifier)
    pub sub: String,
    /// Tenant the client belongs to, absent for superusers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Scope a resolved client operates under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantScope {
    /// Regular client, bound to one tenant.
    Tenant(Uuid),
    /// Superuser: receives every tenant's traffic.
    Superuser,
}

/// A client identity resolved from a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub client_id: String,
    pub scope: TenantScope,
}

/// Verifies access tokens and resolves client identities.
#[derive(Clone)]
pub struct IdentityResolver {
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    /// Leeway in seconds for clock skew tolerance
    pub leeway_secs: u64,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("algorithm", &self.algorithm)
            .field("leeway_secs", &self.leeway_secs)
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

/// Default leeway in seconds for clock skew tolerance
pub const DEFAULT_LEEWAY_SECS: u64 = 30;

impl IdentityResolver {
    /// Creates a resolver from an RSA public key in PEM format.
    pub fn from_rsa_pem(public_key_pem: &str, leeway_secs: u64) -> Result<Self, AuthError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| AuthError::InvalidKey(format!("Invalid public key: {}", e)))?;
        Ok(Self {
            decoding_key,
            algorithm: Algorithm::RS256,
            leeway_secs,
        })
    }

    /// Creates a resolver with an HS256 symmetric key.
    /// DO NOT use in production - only for tests and local development.
    pub fn from_secret(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
            leeway_secs: 0,
        }
    }

    /// Resolves a credential to a client identity.
    ///
    /// Any failure (expired, malformed, bad signature) is an
    /// `AuthError`; callers must treat it as terminal for the
    /// connection and never register the client anywhere first.
    pub fn resolve(&self, token: &str) -> Result<ClientIdentity, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = self.leeway_secs;
        validation.validate_exp = true;

        let data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })?;

        let scope = match data.claims.tenant_id {
            Some(tenant_id) => TenantScope::Tenant(tenant_id),
            None => TenantScope::Superuser,
        };

        Ok(ClientIdentity {
            client_id: data.claims.sub,
            scope,
        })
    }
}

/// Issues a token for the given subject with an HS256 secret.
/// Test helper matching `IdentityResolver::from_secret`.
pub fn issue_for_testing(secret: &str, sub: &str, tenant_id: Option<Uuid>) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: sub.to_string(),
        tenant_id,
        exp: now + 3600,
        iat: now,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode test token")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_tenant_scope() {
        let resolver = IdentityResolver::from_secret("test-secret");
        let tenant = Uuid::new_v4();
        let token = issue_for_testing("test-secret", "client-1", Some(tenant));

        let identity = resolver.resolve(&token).expect("token should resolve");
        assert_eq!(identity.client_id, "client-1");
        assert_eq!(identity.scope, TenantScope::Tenant(tenant));
    }

    #[test]
    fn test_resolve_superuser_scope() {
        let resolver = IdentityResolver::from_secret("test-secret");
        let token = issue_for_testing("test-secret", "admin", None);

        let identity = resolver.resolve(&token).expect("token should resolve");
        assert_eq!(identity.scope, TenantScope::Superuser);
    }

    #[test]
    fn test_resolve_rejects_wrong_secret() {
        let resolver = IdentityResolver::from_secret("test-secret");
        let token = issue_for_testing("other-secret", "client-1", None);

        assert!(matches!(
            resolver.resolve(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        let resolver = IdentityResolver::from_secret("test-secret");
        assert!(resolver.resolve("not-a-token").is_err());
    }

    #[test]
    fn test_resolve_rejects_expired() {
        let resolver = IdentityResolver::from_secret("test-secret");
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: "client-1".to_string(),
            tenant_id: None,
            exp: now - 120,
            iat: now - 3600,
        };
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(matches!(
            resolver.resolve(&token),
            Err(AuthError::TokenExpired)
        ));
    }
}
