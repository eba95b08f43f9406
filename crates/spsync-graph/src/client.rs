//! Microsoft Graph API client
//!
//! Provides a typed HTTP client bound to one tenant. Every request fetches a
//! bearer token from the shared [`IAuthenticator`] (served from its cache when
//! fresh), carries the configured timeout, and is retried on 429 and 5xx
//! responses honouring `Retry-After`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use spsync_core::domain::Tenant;
//! use spsync_core::ports::IAuthenticator;
//! use spsync_graph::client::{GraphClient, GraphClientOptions};
//!
//! # async fn example(tenant: Tenant, auth: Arc<dyn IAuthenticator>) -> Result<(), spsync_graph::GraphError> {
//! let client = GraphClient::new(tenant, auth, GraphClientOptions::default())?;
//! let root: serde_json::Value = client.get_json("/sites/root").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use spsync_core::config::GraphConfig;
use spsync_core::domain::Tenant;
use spsync_core::ports::IAuthenticator;

use crate::models::GraphErrorEnvelope;
use crate::GraphError;

/// Base URL for Microsoft Graph API v1.0
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default retry-after duration when a 429 carries no usable header
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Default number of retries for 429/5xx responses
const DEFAULT_MAX_RETRIES: u32 = 5;

/// Longest wait honoured from a `Retry-After` header
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Connection settings for [`GraphClient`]
#[derive(Debug, Clone)]
pub struct GraphClientOptions {
    /// API root without trailing slash
    pub base_url: String,
    /// Timeout for every request
    pub timeout: Duration,
    /// Retries after the first attempt for 429/5xx responses
    pub max_retries: u32,
    /// Wait used for 429 responses without a `Retry-After` header
    pub default_retry_after: Duration,
    /// First backoff step for 5xx responses without `Retry-After`
    pub server_error_backoff: Duration,
}

impl Default for GraphClientOptions {
    fn default() -> Self {
        Self {
            base_url: GRAPH_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            max_retries: DEFAULT_MAX_RETRIES,
            default_retry_after: DEFAULT_RETRY_AFTER,
            server_error_backoff: Duration::from_secs(1),
        }
    }
}

impl From<&GraphConfig> for GraphClientOptions {
    fn from(config: &GraphConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries,
            ..Self::default()
        }
    }
}

/// Whether a request carries the tenant's bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    /// Graph endpoints
    Bearer,
    /// Pre-authenticated URLs such as upload sessions
    None,
}

/// HTTP client for Microsoft Graph API calls on behalf of one tenant
#[derive(Clone)]
pub struct GraphClient {
    http: Client,
    tenant: Tenant,
    auth: Arc<dyn IAuthenticator>,
    options: GraphClientOptions,
}

impl GraphClient {
    /// Creates a new GraphClient for `tenant`
    ///
    /// # Errors
    /// Returns `GraphError::NetworkError` if the HTTP client cannot be built
    pub fn new(
        tenant: Tenant,
        auth: Arc<dyn IAuthenticator>,
        options: GraphClientOptions,
    ) -> Result<Self, GraphError> {
        let http = Client::builder().timeout(options.timeout).build()?;
        Ok(Self {
            http,
            tenant,
            auth,
            options,
        })
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn options(&self) -> &GraphClientOptions {
        &self.options
    }

    /// Absolute URL for an API path such as `/sites/root`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.options.base_url, path)
    }

    /// Sends a request, retrying 429 and 5xx responses
    ///
    /// `decorate` is applied to a fresh builder on every attempt, so bodies
    /// must be cheap to rebuild. A 401 on a bearer request drops the cached
    /// token and retries once. The last response is returned as-is once
    /// retries are exhausted; use [`check_status`] to turn it into an error.
    pub async fn execute_with_retry<F>(
        &self,
        method: Method,
        url: &str,
        auth: Auth,
        decorate: F,
    ) -> Result<Response, GraphError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder + Send + Sync,
    {
        let max_retries = self.options.max_retries;
        let mut reauthenticated = false;
        let mut attempt: u32 = 0;

        loop {
            let mut builder = self.http.request(method.clone(), url);
            if auth == Auth::Bearer {
                let token = self.auth.get_token(&self.tenant).await?;
                builder = builder.bearer_auth(token.secret());
            }

            let response = decorate(builder).send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && auth == Auth::Bearer && !reauthenticated {
                warn!(tenant = %self.tenant.id, url, "401 from Graph, refreshing token");
                self.auth.clear_cache(Some(&self.tenant.id)).await;
                reauthenticated = true;
                continue;
            }

            let transient =
                status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if !transient {
                if attempt > 0 {
                    info!(url, attempt, "Request succeeded after retry");
                }
                return Ok(response);
            }

            if attempt >= max_retries {
                warn!(url, status = status.as_u16(), attempts = attempt + 1, "Retry limit exhausted");
                return Ok(response);
            }

            let delay = self.retry_delay(&response, attempt);
            info!(
                url,
                status = status.as_u16(),
                attempt,
                retry_after_ms = delay.as_millis() as u64,
                "Transient Graph response, backing off"
            );
            drop(response);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn retry_delay(&self, response: &Response, attempt: u32) -> Duration {
        let header = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok());

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return header
                .map(|v| parse_retry_after(v, self.options.default_retry_after))
                .unwrap_or(self.options.default_retry_after);
        }

        let backoff = self
            .options
            .server_error_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(Duration::from_secs(30));
        header.map(|v| parse_retry_after(v, backoff)).unwrap_or(backoff)
    }

    /// `GET` an API path and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GraphError> {
        self.get_json_url(&self.endpoint(path)).await
    }

    /// `GET` an absolute URL (e.g. an `@odata.nextLink`) and decode the JSON body
    pub async fn get_json_url<T: DeserializeOwned>(&self, url: &str) -> Result<T, GraphError> {
        debug!(url, "GET");
        let response = self
            .execute_with_retry(Method::GET, url, Auth::Bearer, |b| b)
            .await?;
        read_json(check_status(response).await?).await
    }

    /// Sends `body` as JSON to an API path and decodes the JSON response
    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, GraphError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        debug!(url, %method, "JSON request");
        let response = self
            .execute_with_retry(method, &url, Auth::Bearer, |b| b.json(body))
            .await?;
        read_json(check_status(response).await?).await
    }
}

/// Maps a non-success response to a [`GraphError`], passing successes through
pub async fn check_status(response: Response) -> Result<Response, GraphError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
        .unwrap_or(DEFAULT_RETRY_AFTER);

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body, status);

    Err(match status {
        StatusCode::UNAUTHORIZED => GraphError::Unauthorized(message),
        StatusCode::FORBIDDEN => GraphError::Forbidden(message),
        StatusCode::NOT_FOUND => GraphError::NotFound(message),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => GraphError::Conflict(message),
        StatusCode::TOO_MANY_REQUESTS => GraphError::TooManyRequests { retry_after },
        s if s.is_server_error() => GraphError::ServerError {
            status: s.as_u16(),
            message,
        },
        s => GraphError::RequestFailed {
            status: s.as_u16(),
            message,
        },
    })
}

/// Extracts `error.code: error.message` from a Graph error body
fn error_message(body: &str, status: StatusCode) -> String {
    match serde_json::from_str::<GraphErrorEnvelope>(body) {
        Ok(envelope) => match (envelope.error.code, envelope.error.message) {
            (Some(code), Some(msg)) => format!("{code}: {msg}"),
            (Some(code), None) => code,
            (None, Some(msg)) => msg,
            (None, None) => status.to_string(),
        },
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body.chars().take(512).collect(),
    }
}

/// Decodes a JSON body, reporting shape mismatches as `InvalidResponse`
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, GraphError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| GraphError::InvalidResponse(e.to_string()))
}

/// Parses a `Retry-After` header value
///
/// Accepts delta-seconds and HTTP-dates. Waits longer than an hour and
/// unparseable values fall back to `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds).min(MAX_RETRY_AFTER);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        return match wait.to_std() {
            Ok(d) if d <= MAX_RETRY_AFTER => d,
            Ok(_) => default,
            // Date in the past
            Err(_) => Duration::ZERO,
        };
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
