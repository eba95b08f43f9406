//! App-only authentication for Microsoft Graph
//!
//! Each tenant authenticates with the OAuth2 client-credentials grant against
//! its own directory. Tokens are cached per tenant and reused until they are
//! within [`REFRESH_MARGIN_MINUTES`] of expiry.
//!
//! ## Components
//!
//! - [`ClientCredentialsFlow`] - Token request against the identity platform
//! - [`TokenCache`] - Per-tenant token cache implementing `IAuthenticator`

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use oauth2::basic::BasicClient;
use oauth2::{AuthType, ClientId, ClientSecret, RequestTokenError, Scope, TokenResponse, TokenUrl};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use spsync_core::domain::{Tenant, TenantId};
use spsync_core::ports::{AccessToken, AuthError, IAuthenticator};

/// Default identity platform authority
pub const AUTHORITY_URL: &str = "https://login.microsoftonline.com";

/// Scope granting the application's configured Graph permissions
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tokens are refreshed this many minutes before they expire
pub const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Lifetime assumed when the token response carries no `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

// ============================================================================
// ClientCredentialsFlow
// ============================================================================

/// OAuth2 client-credentials token request
#[derive(Debug, Clone)]
pub struct ClientCredentialsFlow {
    authority_url: String,
    http: reqwest::Client,
}

impl ClientCredentialsFlow {
    /// Creates a flow against `authority_url`, e.g. `https://login.microsoftonline.com`
    pub fn new(authority_url: impl Into<String>) -> Result<Self, AuthError> {
        // The token endpoint must never redirect with credentials attached
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::InvalidConfig(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            authority_url: authority_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Token endpoint for a directory
    pub fn token_url(&self, directory_id: &str) -> String {
        format!("{}/{directory_id}/oauth2/v2.0/token", self.authority_url)
    }

    /// Requests a fresh app-only token for `tenant`
    pub async fn request_token(
        &self,
        tenant: &Tenant,
        client_secret: &str,
    ) -> Result<AccessToken, AuthError> {
        let token_url = TokenUrl::new(self.token_url(&tenant.directory_id))
            .map_err(|e| AuthError::InvalidConfig(format!("invalid token URL: {e}")))?;

        let client = BasicClient::new(ClientId::new(tenant.client_id.clone()))
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(token_url);

        debug!(tenant = %tenant.id, "Requesting client-credentials token");

        let response = client
            .exchange_client_credentials()
            .add_scope(Scope::new(GRAPH_DEFAULT_SCOPE.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(resp) => {
                    let mut message = resp.error().to_string();
                    if let Some(description) = resp.error_description() {
                        message.push_str(": ");
                        message.push_str(description);
                    }
                    AuthError::TokenRequest(message)
                }
                other => AuthError::TokenRequest(other.to_string()),
            })?;

        let lifetime = response
            .expires_in()
            .and_then(|d| Duration::from_std(d).ok())
            .unwrap_or_else(|| Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));

        Ok(AccessToken::new(
            response.access_token().secret().clone(),
            Utc::now() + lifetime,
        ))
    }
}

// ============================================================================
// TokenCache
// ============================================================================

/// Looks up a client secret by environment variable name
pub type SecretLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

fn env_secret(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Per-tenant token cache
///
/// Concurrent callers for the same tenant share one token request: each
/// tenant has its own async lock, held while a token is fetched.
pub struct TokenCache {
    flow: ClientCredentialsFlow,
    secret_lookup: SecretLookup,
    tokens: DashMap<TenantId, Arc<Mutex<Option<AccessToken>>>>,
    refresh_margin: Duration,
}

impl TokenCache {
    /// Creates a cache reading client secrets from the environment
    pub fn new(flow: ClientCredentialsFlow) -> Self {
        Self::with_secret_lookup(flow, Box::new(env_secret))
    }

    pub fn with_secret_lookup(flow: ClientCredentialsFlow, secret_lookup: SecretLookup) -> Self {
        Self {
            flow,
            secret_lookup,
            tokens: DashMap::new(),
            refresh_margin: Duration::minutes(REFRESH_MARGIN_MINUTES),
        }
    }

    fn slot(&self, tenant: &TenantId) -> Arc<Mutex<Option<AccessToken>>> {
        self.tokens.entry(tenant.clone()).or_default().clone()
    }
}

#[async_trait::async_trait]
impl IAuthenticator for TokenCache {
    async fn get_token(&self, tenant: &Tenant) -> Result<AccessToken, AuthError> {
        let slot = self.slot(&tenant.id);
        let mut cached = slot.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid_for(self.refresh_margin) {
                return Ok(token.clone());
            }
            debug!(tenant = %tenant.id, "Cached token near expiry, refreshing");
        }

        let secret = (self.secret_lookup)(&tenant.client_secret_env)
            .ok_or_else(|| AuthError::MissingSecret(tenant.client_secret_env.clone()))?;

        let token = self.flow.request_token(tenant, &secret).await.map_err(|e| {
            warn!(tenant = %tenant.id, error = %e, "Token request failed");
            e
        })?;

        info!(tenant = %tenant.id, expires_at = %token.expires_at(), "Acquired access token");
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn clear_cache(&self, tenant: Option<&TenantId>) {
        match tenant {
            Some(id) => {
                self.tokens.remove(id);
                debug!(tenant = %id, "Cleared cached token");
            }
            None => {
                self.tokens.clear();
                debug!("Cleared all cached tokens");
            }
        }
    }
}
