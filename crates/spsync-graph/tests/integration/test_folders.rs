//! Folder creation along a drive path

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use spsync_core::domain::RemotePath;
use spsync_core::ports::{IRemoteStore, RemoteError};

use crate::common::{self, DRIVE_ID};

#[tokio::test]
async fn test_root_resolves_without_writes() {
    let (server, store, _auth) = common::setup_store().await;
    common::mount_drive_root(&server).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let item = store
        .ensure_folder(DRIVE_ID, &RemotePath::root())
        .await
        .unwrap();
    assert_eq!(item.id, "root-id");
    assert!(item.is_folder);
}

#[tokio::test]
async fn test_creates_only_missing_segments() {
    let (server, store, _auth) = common::setup_store().await;
    common::mount_drive_root(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/root:/Archive")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::folder_json("f-archive", "Archive")),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/root:/Archive/2026")))
        .respond_with(common::not_found())
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/drives/{DRIVE_ID}/items/f-archive/children")))
        .and(body_partial_json(json!({
            "name": "2026",
            "@microsoft.graph.conflictBehavior": "fail"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::folder_json("f-2026", "2026")))
        .expect(1)
        .mount(&server)
        .await;

    let item = store
        .ensure_folder(DRIVE_ID, &RemotePath::new("/Archive/2026").unwrap())
        .await
        .unwrap();

    assert_eq!(item.id, "f-2026");
    assert_eq!(item.name, "2026");
}

#[tokio::test]
async fn test_segments_are_sanitized() {
    let (server, store, _auth) = common::setup_store().await;
    common::mount_drive_root(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/root:/Q1_Q2")))
        .respond_with(common::not_found())
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/drives/{DRIVE_ID}/items/root-id/children")))
        .and(body_partial_json(json!({ "name": "Q1_Q2" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::folder_json("f-q", "Q1_Q2")))
        .expect(1)
        .mount(&server)
        .await;

    let item = store
        .ensure_folder(DRIVE_ID, &RemotePath::new("/Q1|Q2").unwrap())
        .await
        .unwrap();
    assert_eq!(item.id, "f-q");
}

#[tokio::test]
async fn test_file_in_the_way_is_a_conflict() {
    let (server, store, _auth) = common::setup_store().await;
    common::mount_drive_root(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/root:/Archive")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::file_json("file-1", "Archive", 10)),
        )
        .mount(&server)
        .await;

    let err = store
        .ensure_folder(DRIVE_ID, &RemotePath::new("/Archive").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Conflict(_)), "{err:?}");
}

#[tokio::test]
async fn test_concurrent_creation_surfaces_conflict() {
    let (server, store, _auth) = common::setup_store().await;
    common::mount_drive_root(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/root:/Reports")))
        .respond_with(common::not_found())
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/drives/{DRIVE_ID}/items/root-id/children")))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": { "code": "nameAlreadyExists", "message": "An item with the same name already exists." }
        })))
        .mount(&server)
        .await;

    let err = store
        .ensure_folder(DRIVE_ID, &RemotePath::new("/Reports").unwrap())
        .await
        .unwrap_err();
    match err {
        RemoteError::Conflict(message) => assert!(message.contains("nameAlreadyExists")),
        other => panic!("unexpected error: {other:?}"),
    }
}
