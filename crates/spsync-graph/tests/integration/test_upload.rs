//! Small and chunked uploads

use std::sync::Mutex;

use serde_json::json;
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use spsync_core::domain::{ConflictBehavior, RemotePath};
use spsync_core::ports::{IRemoteStore, RemoteError, UploadContent};
use spsync_graph::upload::UploadOptions;

use crate::common::{self, DRIVE_ID};

#[tokio::test]
async fn test_small_upload_single_put() {
    let (server, store, _auth) = common::setup_store().await;
    let data = b"quarterly numbers".to_vec();

    Mock::given(method("PUT"))
        .and(path(format!("/drives/{DRIVE_ID}/root:/Archive/report.txt:/content")))
        .and(query_param("@microsoft.graph.conflictBehavior", "replace"))
        .and(header("authorization", "Bearer token-0"))
        .and(body_bytes(data.clone()))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(common::file_json("item-1", "report.txt", 17)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let progress = Mutex::new(Vec::new());
    let on_progress = |sent: u64, total: u64| progress.lock().unwrap().push((sent, total));

    let item = store
        .upload_file(
            DRIVE_ID,
            &RemotePath::new("/Archive").unwrap(),
            "report.txt",
            UploadContent::Bytes(data),
            ConflictBehavior::Replace,
            Some(&on_progress),
        )
        .await
        .unwrap();

    assert_eq!(item.id, "item-1");
    assert_eq!(item.size, 17);
    assert!(item.web_url.is_some());
    assert_eq!(*progress.lock().unwrap(), vec![(17, 17)]);
}

#[tokio::test]
async fn test_small_upload_at_root_with_sanitized_name() {
    let (server, store, _auth) = common::setup_store().await;

    Mock::given(method("PUT"))
        .and(path(format!("/drives/{DRIVE_ID}/root:/q_.txt:/content")))
        .and(query_param("@microsoft.graph.conflictBehavior", "rename"))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::file_json("item-q", "q_.txt", 1)))
        .expect(1)
        .mount(&server)
        .await;

    let item = store
        .upload_file(
            DRIVE_ID,
            &RemotePath::root(),
            "q?.txt",
            UploadContent::Bytes(vec![b'x']),
            ConflictBehavior::Rename,
            None,
        )
        .await
        .unwrap();
    assert_eq!(item.name, "q_.txt");
}

#[tokio::test]
async fn test_small_upload_reads_file_from_disk() {
    let (server, store, _auth) = common::setup_store().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.md");
    std::fs::write(&file, b"# notes").unwrap();

    Mock::given(method("PUT"))
        .and(path(format!("/drives/{DRIVE_ID}/root:/notes.md:/content")))
        .and(body_bytes(b"# notes".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::file_json("item-n", "notes.md", 7)))
        .expect(1)
        .mount(&server)
        .await;

    let item = store
        .upload_file(
            DRIVE_ID,
            &RemotePath::root(),
            "notes.md",
            UploadContent::File { path: file, size: 7 },
            ConflictBehavior::Replace,
            None,
        )
        .await
        .unwrap();
    assert_eq!(item.id, "item-n");
}

#[tokio::test]
async fn test_chunked_upload_through_session() {
    let options = UploadOptions {
        small_upload_limit: 8,
        chunk_size: 10,
    };
    let (server, store, _auth) = common::setup_store_with(options).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("big.bin");
    let content: Vec<u8> = (0..25u8).collect();
    std::fs::write(&file, &content).unwrap();

    let session_url = format!("{}/upload-session/abc", server.uri());
    Mock::given(method("POST"))
        .and(path(format!("/drives/{DRIVE_ID}/root:/big.bin:/createUploadSession")))
        .and(wiremock::matchers::body_json(json!({
            "item": { "@microsoft.graph.conflictBehavior": "fail" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uploadUrl": session_url,
            "expirationDateTime": "2026-10-18T00:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    for (range, body) in [("bytes 0-9/25", &content[0..10]), ("bytes 10-19/25", &content[10..20])] {
        Mock::given(method("PUT"))
            .and(path("/upload-session/abc"))
            .and(header("content-range", range))
            .and(body_bytes(body.to_vec()))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "nextExpectedRanges": ["10-"]
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("PUT"))
        .and(path("/upload-session/abc"))
        .and(header("content-range", "bytes 20-24/25"))
        .and(body_bytes(content[20..25].to_vec()))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::file_json("item-big", "big.bin", 25)))
        .expect(1)
        .mount(&server)
        .await;

    let progress = Mutex::new(Vec::new());
    let on_progress = |sent: u64, total: u64| progress.lock().unwrap().push((sent, total));

    let item = store
        .upload_file(
            DRIVE_ID,
            &RemotePath::root(),
            "big.bin",
            UploadContent::File { path: file, size: 25 },
            ConflictBehavior::Fail,
            Some(&on_progress),
        )
        .await
        .unwrap();

    assert_eq!(item.id, "item-big");
    assert_eq!(*progress.lock().unwrap(), vec![(10, 25), (20, 25), (25, 25)]);

    // Session URLs are pre-authorized; chunk requests carry no bearer token
    let requests = server.received_requests().await.unwrap();
    let chunk_requests: Vec<_> = requests
        .iter()
        .filter(|r| r.url.path() == "/upload-session/abc")
        .collect();
    assert_eq!(chunk_requests.len(), 3);
    assert!(chunk_requests
        .iter()
        .all(|r| !r.headers.contains_key("authorization")));
}

#[tokio::test]
async fn test_session_ending_without_item_is_invalid() {
    let options = UploadOptions {
        small_upload_limit: 2,
        chunk_size: 4,
    };
    let (server, store, _auth) = common::setup_store_with(options).await;

    Mock::given(method("POST"))
        .and(path(format!("/drives/{DRIVE_ID}/root:/x.bin:/createUploadSession")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uploadUrl": format!("{}/upload-session/x", server.uri())
        })))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/upload-session/x"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = store
        .upload_file(
            DRIVE_ID,
            &RemotePath::root(),
            "x.bin",
            UploadContent::Bytes(vec![1, 2, 3]),
            ConflictBehavior::Replace,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn test_rejected_upload_is_upload_error() {
    let (server, store, _auth) = common::setup_store().await;

    Mock::given(method("PUT"))
        .and(path(format!("/drives/{DRIVE_ID}/root:/bad.txt:/content")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "invalidRequest", "message": "Invalid request" }
        })))
        .mount(&server)
        .await;

    let err = store
        .upload_file(
            DRIVE_ID,
            &RemotePath::root(),
            "bad.txt",
            UploadContent::Bytes(b"nope".to_vec()),
            ConflictBehavior::Replace,
            None,
        )
        .await
        .unwrap_err();

    match err {
        RemoteError::Upload(message) => assert!(message.contains("invalidRequest"), "{message}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_local_file_is_upload_error() {
    let (_server, store, _auth) = common::setup_store().await;
    let dir = tempfile::tempdir().unwrap();

    let err = store
        .upload_file(
            DRIVE_ID,
            &RemotePath::root(),
            "gone.txt",
            UploadContent::File {
                path: dir.path().join("gone.txt"),
                size: 3,
            },
            ConflictBehavior::Replace,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Upload(_)), "{err:?}");
}
