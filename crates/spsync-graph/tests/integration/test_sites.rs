//! Site and library resolution

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use spsync_core::ports::{IRemoteStore, RemoteError};

use crate::common;

#[tokio::test]
async fn test_resolve_site_by_url() {
    let (server, store, _auth) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/sites/contoso.sharepoint.com:/sites/Finance"))
        .and(header("authorization", "Bearer token-0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "contoso.sharepoint.com,aaa,bbb",
            "displayName": "Finance",
            "webUrl": "https://contoso.sharepoint.com/sites/Finance"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let site = store
        .resolve_site("https://contoso.sharepoint.com/sites/Finance/")
        .await
        .unwrap();

    assert_eq!(site.id, "contoso.sharepoint.com,aaa,bbb");
    assert_eq!(site.name, "Finance");
}

#[tokio::test]
async fn test_resolve_root_site() {
    let (server, store, _auth) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/sites/contoso.sharepoint.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "root-site",
            "name": "Communication site"
        })))
        .mount(&server)
        .await;

    let site = store
        .resolve_site("https://contoso.sharepoint.com")
        .await
        .unwrap();
    assert_eq!(site.id, "root-site");
}

#[tokio::test]
async fn test_unknown_site_is_not_found() {
    let (server, store, _auth) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/sites/contoso.sharepoint.com:/sites/Nope"))
        .respond_with(common::not_found())
        .mount(&server)
        .await;

    let err = store
        .resolve_site("https://contoso.sharepoint.com/sites/Nope")
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::NotFound(_)), "{err:?}");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_resolve_library_follows_pages_and_ignores_case() {
    let (server, store, _auth) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/sites/site-1/drives"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "drive-1", "name": "Archive" }],
            "@odata.nextLink": format!("{}/sites/site-1/drives-page-2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/sites/site-1/drives-page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{
                "id": "drive-2",
                "name": "Shared Documents",
                "webUrl": "https://contoso.sharepoint.com/Shared%20Documents"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let drive = store
        .resolve_library("site-1", "shared documents")
        .await
        .unwrap();

    assert_eq!(drive.id, "drive-2");
    assert_eq!(drive.name, "Shared Documents");
}

#[tokio::test]
async fn test_missing_library_is_not_found() {
    let (server, store, _auth) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/sites/site-1/drives"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "drive-1", "name": "Documents" }]
        })))
        .mount(&server)
        .await;

    let err = store.resolve_library("site-1", "Invoices").await.unwrap_err();
    match err {
        RemoteError::NotFound(message) => assert!(message.contains("Invoices")),
        other => panic!("unexpected error: {other:?}"),
    }
}
