//! spsync Graph - Microsoft Graph client for SharePoint document libraries
//!
//! Provides an async client for:
//! - App-only authentication (OAuth2 client credentials) with a per-tenant token cache
//! - Site and document library resolution
//! - Folder materialization
//! - Small (single PUT) and chunked (upload session) uploads
//!
//! ## Modules
//!
//! - [`auth`] - Client-credentials flow and the shared token cache
//! - [`client`] - HTTP client with bearer tokens, timeouts and 429/5xx retry
//! - [`sites`] - Site and library lookup
//! - [`folders`] - Folder creation along a path
//! - [`upload`] - Small and chunked uploads
//! - [`sanitize`] - SharePoint name rules
//! - [`provider`] - `IRemoteStore` / `IRemoteConnector` adapters

pub mod auth;
pub mod client;
pub mod folders;
pub mod models;
pub mod provider;
pub mod sanitize;
pub mod sites;
pub mod upload;

use std::time::Duration;

use spsync_core::ports::{AuthError, RemoteError};
use thiserror::Error;

/// Errors that can occur when communicating with the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The name is taken (e.g. a folder created concurrently)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Any other non-success status
    #[error("Request failed ({status}): {message}")]
    RequestFailed { status: u16, message: String },

    /// The upload was rejected or did not complete
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Reading local content failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No token could be obtained
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<GraphError> for RemoteError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Unauthorized(msg) | GraphError::Forbidden(msg) => RemoteError::Auth(msg),
            GraphError::Auth(e) => RemoteError::Auth(e.to_string()),
            GraphError::NotFound(msg) => RemoteError::NotFound(msg),
            GraphError::Conflict(msg) => RemoteError::Conflict(msg),
            GraphError::TooManyRequests { retry_after } => RemoteError::Throttled {
                retry_after_secs: retry_after.as_secs(),
            },
            GraphError::ServerError { status, message } => RemoteError::Server { status, message },
            GraphError::UploadFailed(msg) => RemoteError::Upload(msg),
            GraphError::Io(e) => RemoteError::Upload(format!("cannot read local file: {e}")),
            GraphError::NetworkError(e) => RemoteError::Network(e.to_string()),
            GraphError::RequestFailed { status, message } => {
                RemoteError::InvalidResponse(format!("HTTP {status}: {message}"))
            }
            GraphError::InvalidResponse(msg) => RemoteError::InvalidResponse(msg),
        }
    }
}
