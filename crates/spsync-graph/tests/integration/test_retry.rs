//! Throttling, server-error and token-refresh retries

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use spsync_core::ports::{IRemoteStore, RemoteError};

use crate::common;

const SITE_PATH: &str = "/sites/contoso.sharepoint.com:/sites/Finance";
const SITE_URL: &str = "https://contoso.sharepoint.com/sites/Finance";

fn site_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "id": "site-1", "displayName": "Finance" }))
}

#[tokio::test]
async fn test_throttled_request_is_retried() {
    let (server, store, _auth) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path(SITE_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(SITE_PATH))
        .respond_with(site_ok())
        .expect(1)
        .mount(&server)
        .await;

    let site = store.resolve_site(SITE_URL).await.unwrap();
    assert_eq!(site.id, "site-1");
}

#[tokio::test]
async fn test_server_errors_back_off_then_succeed() {
    let (server, store, _auth) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path(SITE_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(SITE_PATH))
        .respond_with(site_ok())
        .expect(1)
        .mount(&server)
        .await;

    assert!(store.resolve_site(SITE_URL).await.is_ok());
}

#[tokio::test]
async fn test_persistent_throttling_gives_up() {
    let (server, store, _auth) = common::setup_store().await;

    // max_retries is 2: one attempt plus two retries
    Mock::given(method("GET"))
        .and(path(SITE_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let err = store.resolve_site(SITE_URL).await.unwrap_err();
    assert_eq!(err, RemoteError::Throttled { retry_after_secs: 0 });
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_persistent_server_error_is_transient() {
    let (server, store, _auth) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path(SITE_PATH))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let err = store.resolve_site(SITE_URL).await.unwrap_err();
    assert!(matches!(err, RemoteError::Server { status: 502, .. }), "{err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unauthorized_refreshes_token_once() {
    let (server, store, auth) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path(SITE_PATH))
        .and(header("authorization", "Bearer token-0"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(SITE_PATH))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(site_ok())
        .expect(1)
        .mount(&server)
        .await;

    assert!(store.resolve_site(SITE_URL).await.is_ok());
    assert_eq!(auth.clears(), 1);
}

#[tokio::test]
async fn test_repeated_unauthorized_is_auth_error() {
    let (server, store, auth) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path(SITE_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": "InvalidAuthenticationToken", "message": "Access token has expired." }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let err = store.resolve_site(SITE_URL).await.unwrap_err();
    assert!(matches!(err, RemoteError::Auth(_)), "{err:?}");
    assert!(!err.is_transient());
    assert_eq!(auth.clears(), 1);
}
