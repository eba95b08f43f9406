//! Shared test helpers for Graph API integration tests
//!
//! Each helper returns a store or client pointed at a wiremock server, with
//! retry delays shrunk so backoff paths run instantly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spsync_core::domain::{Tenant, TenantId};
use spsync_core::ports::{AccessToken, AuthError, IAuthenticator};
use spsync_graph::client::{GraphClient, GraphClientOptions};
use spsync_graph::provider::GraphRemoteStore;
use spsync_graph::upload::UploadOptions;

pub const DRIVE_ID: &str = "drive-001";

pub fn test_tenant() -> Tenant {
    Tenant {
        id: TenantId::new("contoso").unwrap(),
        name: "Contoso".to_string(),
        directory_id: "dir-123".to_string(),
        client_id: "client-abc".to_string(),
        client_secret_env: "CONTOSO_SECRET".to_string(),
        enabled: true,
        mappings: Vec::new(),
    }
}

/// Authenticator handing out `token-N`, counting requests and cache clears
#[derive(Default)]
pub struct CountingAuth {
    pub issued: AtomicUsize,
    pub clears: AtomicUsize,
}

impl CountingAuth {
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IAuthenticator for CountingAuth {
    async fn get_token(&self, _tenant: &Tenant) -> Result<AccessToken, AuthError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken::new(
            format!("token-{n}"),
            Utc::now() + chrono::Duration::hours(1),
        ))
    }

    async fn clear_cache(&self, _tenant: Option<&TenantId>) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn options_for(server: &MockServer) -> GraphClientOptions {
    GraphClientOptions {
        base_url: server.uri(),
        timeout: Duration::from_secs(10),
        max_retries: 2,
        default_retry_after: Duration::from_millis(5),
        server_error_backoff: Duration::from_millis(1),
    }
}

pub async fn setup_client() -> (MockServer, GraphClient, Arc<CountingAuth>) {
    let server = MockServer::start().await;
    let auth = Arc::new(CountingAuth::default());
    let client = GraphClient::new(test_tenant(), auth.clone(), options_for(&server)).unwrap();
    (server, client, auth)
}

pub async fn setup_store_with(
    upload_options: UploadOptions,
) -> (MockServer, GraphRemoteStore, Arc<CountingAuth>) {
    let (server, client, auth) = setup_client().await;
    (server, GraphRemoteStore::new(client, upload_options), auth)
}

pub async fn setup_store() -> (MockServer, GraphRemoteStore, Arc<CountingAuth>) {
    setup_store_with(UploadOptions::default()).await
}

pub fn folder_json(id: &str, name: &str) -> serde_json::Value {
    json!({ "id": id, "name": name, "folder": { "childCount": 0 } })
}

pub fn file_json(id: &str, name: &str, size: u64) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "size": size,
        "webUrl": format!("https://contoso.sharepoint.com/Shared%20Documents/{name}"),
        "lastModifiedDateTime": "2026-10-17T08:30:00Z",
        "file": { "mimeType": "application/octet-stream" }
    })
}

pub fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "error": { "code": "itemNotFound", "message": "The resource could not be found." }
    }))
}

/// Mounts `GET /drives/{DRIVE_ID}/root`
pub async fn mount_drive_root(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/root")))
        .respond_with(ResponseTemplate::new(200).set_body_json(folder_json("root-id", "root")))
        .mount(server)
        .await;
}
