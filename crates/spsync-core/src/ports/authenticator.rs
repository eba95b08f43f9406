//! Authenticator port (driven/secondary port)
//!
//! Supplies bearer tokens per tenant. Implementations are expected to cache
//! tokens; callers ask for a token before every request.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::domain::{Tenant, TenantId};

/// Errors raised while acquiring a token
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The environment variable holding the client secret is unset or empty
    #[error("Client secret not found in environment variable {0}")]
    MissingSecret(String),

    /// Tenant credentials are malformed
    #[error("Invalid credentials configuration: {0}")]
    InvalidConfig(String),

    /// The token endpoint rejected the request or could not be reached
    #[error("Token request failed: {0}")]
    TokenRequest(String),
}

/// A bearer token with its expiry
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// The raw bearer value
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the token is still valid `margin` from now
    pub fn is_valid_for(&self, margin: Duration) -> bool {
        Utc::now() + margin < self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Port trait for tenant token acquisition
#[async_trait::async_trait]
pub trait IAuthenticator: Send + Sync {
    /// Returns a token for the tenant, from cache when still fresh
    async fn get_token(&self, tenant: &Tenant) -> Result<AccessToken, AuthError>;

    /// Returns true if a token can be obtained for the tenant
    async fn test_auth(&self, tenant: &Tenant) -> bool {
        self.get_token(tenant).await.is_ok()
    }

    /// Drops cached tokens for one tenant, or for all when `None`
    async fn clear_cache(&self, tenant: Option<&TenantId>);
}
