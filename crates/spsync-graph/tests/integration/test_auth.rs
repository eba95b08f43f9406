//! Client-credentials token acquisition and caching

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spsync_core::ports::{AuthError, IAuthenticator};
use spsync_graph::auth::{ClientCredentialsFlow, TokenCache};

use crate::common;

fn cache_for(server: &MockServer) -> TokenCache {
    let flow = ClientCredentialsFlow::new(server.uri()).unwrap();
    TokenCache::with_secret_lookup(flow, Box::new(|_| Some("s3cret".to_string())))
}

fn token_response(token: &str, expires_in: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": token,
        "token_type": "Bearer",
        "expires_in": expires_in
    }))
}

#[tokio::test]
async fn test_token_request_uses_client_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dir-123/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=client-abc"))
        .and(body_string_contains("client_secret=s3cret"))
        .and(body_string_contains("graph.microsoft.com%2F.default"))
        .respond_with(token_response("tok-1", 3600))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    let token = cache.get_token(&common::test_tenant()).await.unwrap();

    assert_eq!(token.secret(), "tok-1");
    assert!(token.is_valid_for(chrono::Duration::minutes(50)));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dir-123/oauth2/v2.0/token"))
        .respond_with(token_response("tok-shared", 3600))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(cache_for(&server));
    let mut handles = Vec::new();
    for _ in 0..5 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache.get_token(&common::test_tenant()).await
        }));
    }

    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(token.secret(), "tok-shared");
    }
}

#[tokio::test]
async fn test_near_expiry_token_is_refreshed() {
    let server = MockServer::start().await;
    // 60s is inside the refresh margin, so every call fetches again
    Mock::given(method("POST"))
        .and(path("/dir-123/oauth2/v2.0/token"))
        .respond_with(token_response("short-lived", 60))
        .expect(2)
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    let tenant = common::test_tenant();
    cache.get_token(&tenant).await.unwrap();
    cache.get_token(&tenant).await.unwrap();
}

#[tokio::test]
async fn test_clear_cache_forces_new_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dir-123/oauth2/v2.0/token"))
        .respond_with(token_response("tok", 3600))
        .expect(2)
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    let tenant = common::test_tenant();
    cache.get_token(&tenant).await.unwrap();
    cache.get_token(&tenant).await.unwrap();
    cache.clear_cache(Some(&tenant.id)).await;
    cache.get_token(&tenant).await.unwrap();
}

#[tokio::test]
async fn test_rejected_credentials_surface_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dir-123/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    let err = cache.get_token(&common::test_tenant()).await.unwrap_err();

    match err {
        AuthError::TokenRequest(message) => {
            assert!(message.contains("invalid_client"), "{message}");
            assert!(message.contains("Invalid client secret"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!cache.test_auth(&common::test_tenant()).await);
}
