//! Upload operations for SharePoint document libraries
//!
//! - [`upload_small`] - Single `PUT` for content up to the small-upload limit
//! - [`upload_large`] - Resumable upload session, sent in fixed-size chunks
//! - [`create_upload_session`] - Opens a resumable upload session
//! - [`upload_chunk`] - Sends one byte range within a session
//!
//! ## Microsoft Graph API References
//!
//! - [Upload small files](https://learn.microsoft.com/en-us/graph/api/driveitem-put-content)
//! - [Upload large files](https://learn.microsoft.com/en-us/graph/api/driveitem-createuploadsession)

use std::ops::Range;
use std::path::Path;

use reqwest::{Method, StatusCode};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

use spsync_core::domain::{ConflictBehavior, RemotePath};
use spsync_core::ports::{UploadContent, UploadProgressFn};

use crate::client::{check_status, read_json, Auth, GraphClient};
use crate::models::{GraphDriveItem, UploadSessionResponse};
use crate::sanitize::{sanitize_name, sanitize_path};
use crate::GraphError;

/// Content up to this size goes in a single request: 4 MiB
pub const SMALL_UPLOAD_LIMIT: u64 = 4 * 1024 * 1024;

/// Chunk size for upload sessions: 10 MiB
///
/// Graph wants chunk sizes that are multiples of 320 KiB; 10 MiB is 32 of them.
pub const CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Size thresholds for the upload strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    pub small_upload_limit: u64,
    pub chunk_size: u64,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            small_upload_limit: SMALL_UPLOAD_LIMIT,
            chunk_size: CHUNK_SIZE,
        }
    }
}

/// Splits `total` bytes into consecutive ranges of at most `chunk` bytes
pub fn chunk_ranges(total: u64, chunk: u64) -> Vec<Range<u64>> {
    let chunk = chunk.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + chunk).min(total);
        ranges.push(start..end);
        start = end;
    }
    ranges
}

/// Item-by-path API path, e.g. `/drives/{id}/root:/Archive/a.pdf:/content`
fn item_path(drive_id: &str, parent: &RemotePath, name: &str, suffix: &str) -> String {
    if parent.is_root() {
        format!("/drives/{drive_id}/root:/{name}:/{suffix}")
    } else {
        format!("/drives/{drive_id}/root:{}/{name}:/{suffix}", parent.as_str())
    }
}

/// Uploads `data` with a single `PUT`
pub async fn upload_small(
    client: &GraphClient,
    drive_id: &str,
    parent: &RemotePath,
    name: &str,
    data: Vec<u8>,
    conflict: ConflictBehavior,
) -> Result<GraphDriveItem, GraphError> {
    let url = format!(
        "{}?@microsoft.graph.conflictBehavior={}",
        client.endpoint(&item_path(drive_id, parent, name, "content")),
        conflict.as_str()
    );
    debug!(name, bytes = data.len(), "Small upload");

    let response = client
        .execute_with_retry(Method::PUT, &url, Auth::Bearer, |b| {
            b.header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(data.clone())
        })
        .await?;
    let item: GraphDriveItem = read_json(check_status(response).await?).await?;

    debug!(id = %item.id, name = %item.name, "Small upload completed");
    Ok(item)
}

/// Opens an upload session and returns its upload URL
///
/// The session URL is pre-authenticated and expires after a period of
/// inactivity.
pub async fn create_upload_session(
    client: &GraphClient,
    drive_id: &str,
    parent: &RemotePath,
    name: &str,
    conflict: ConflictBehavior,
) -> Result<String, GraphError> {
    let body = json!({
        "item": { "@microsoft.graph.conflictBehavior": conflict.as_str() }
    });
    let session: UploadSessionResponse = client
        .send_json(
            Method::POST,
            &item_path(drive_id, parent, name, "createUploadSession"),
            &body,
        )
        .await?;

    debug!(name, "Upload session created");
    Ok(session.upload_url)
}

/// Sends one chunk to an upload session
///
/// Returns the finished item once the last range is accepted (`200`/`201`)
/// and `None` while more ranges are expected (`202`). No bearer token is
/// sent; the session URL carries its own authorization.
pub async fn upload_chunk(
    client: &GraphClient,
    upload_url: &str,
    data: Vec<u8>,
    offset: u64,
    total: u64,
) -> Result<Option<GraphDriveItem>, GraphError> {
    if data.is_empty() {
        return Err(GraphError::UploadFailed("empty chunk".to_string()));
    }
    let end = offset + data.len() as u64 - 1;
    let content_range = format!("bytes {offset}-{end}/{total}");
    debug!(range = %content_range, "Uploading chunk");

    let response = client
        .execute_with_retry(Method::PUT, upload_url, Auth::None, |b| {
            b.header(reqwest::header::CONTENT_RANGE, content_range.as_str())
                .body(data.clone())
        })
        .await?;
    let response = check_status(response).await?;

    match response.status() {
        StatusCode::OK | StatusCode::CREATED => Ok(Some(read_json(response).await?)),
        _ => Ok(None),
    }
}

async fn read_range(file: &mut tokio::fs::File, range: &Range<u64>) -> Result<Vec<u8>, GraphError> {
    let mut buf = vec![0u8; (range.end - range.start) as usize];
    file.seek(std::io::SeekFrom::Start(range.start)).await?;
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

enum ChunkSource<'a> {
    Memory(&'a [u8]),
    Disk(tokio::fs::File),
}

impl ChunkSource<'_> {
    async fn read(&mut self, range: &Range<u64>) -> Result<Vec<u8>, GraphError> {
        match self {
            ChunkSource::Memory(bytes) => Ok(bytes[range.start as usize..range.end as usize].to_vec()),
            ChunkSource::Disk(file) => read_range(file, range).await,
        }
    }
}

/// Uploads content through an upload session, one chunk at a time
///
/// Files are read from disk per chunk, so memory use stays bounded by the
/// chunk size. `on_progress` is called after every accepted chunk.
#[allow(clippy::too_many_arguments)]
pub async fn upload_large(
    client: &GraphClient,
    drive_id: &str,
    parent: &RemotePath,
    name: &str,
    content: &UploadContent,
    conflict: ConflictBehavior,
    chunk_size: u64,
    on_progress: Option<&UploadProgressFn<'_>>,
) -> Result<GraphDriveItem, GraphError> {
    let total = content.len();
    let ranges = chunk_ranges(total, chunk_size);
    info!(name, total, chunks = ranges.len(), "Starting chunked upload");

    let mut source = match content {
        UploadContent::Bytes(bytes) => ChunkSource::Memory(bytes.as_slice()),
        UploadContent::File { path, .. } => ChunkSource::Disk(open(path).await?),
    };

    let upload_url = create_upload_session(client, drive_id, parent, name, conflict).await?;

    let mut finished = None;
    for range in &ranges {
        let chunk = source.read(range).await?;
        finished = upload_chunk(client, &upload_url, chunk, range.start, total).await?;
        if let Some(callback) = on_progress {
            callback(range.end, total);
        }
    }

    let item = finished.ok_or_else(|| {
        GraphError::InvalidResponse(format!("upload session for {name} ended without an item"))
    })?;
    info!(name, id = %item.id, total, "Chunked upload completed");
    Ok(item)
}

async fn open(path: &Path) -> Result<tokio::fs::File, GraphError> {
    Ok(tokio::fs::File::open(path).await?)
}

/// Uploads `content` as `name` under `parent`, choosing the strategy by size
///
/// Both the parent path and the file name are sanitized. Rejected requests
/// surface as [`GraphError::UploadFailed`].
#[allow(clippy::too_many_arguments)]
pub async fn upload_file(
    client: &GraphClient,
    options: &UploadOptions,
    drive_id: &str,
    parent: &RemotePath,
    name: &str,
    content: UploadContent,
    conflict: ConflictBehavior,
    on_progress: Option<&UploadProgressFn<'_>>,
) -> Result<GraphDriveItem, GraphError> {
    let parent = sanitize_path(parent);
    let name = sanitize_name(name);
    let total = content.len();

    let result = if total <= options.small_upload_limit {
        let data = match content {
            UploadContent::Bytes(bytes) => bytes,
            UploadContent::File { path, .. } => tokio::fs::read(&path).await?,
        };
        let item = upload_small(client, drive_id, &parent, &name, data, conflict).await;
        if let (Ok(_), Some(callback)) = (&item, on_progress) {
            callback(total, total);
        }
        item
    } else {
        upload_large(
            client,
            drive_id,
            &parent,
            &name,
            &content,
            conflict,
            options.chunk_size,
            on_progress,
        )
        .await
    };

    result.map_err(|e| match e {
        GraphError::RequestFailed { status, message } => {
            GraphError::UploadFailed(format!("HTTP {status}: {message}"))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ranges() {
        assert!(chunk_ranges(0, 10).is_empty());
        assert_eq!(chunk_ranges(10, 10), vec![0..10]);
        assert_eq!(chunk_ranges(25, 10), vec![0..10, 10..20, 20..25]);
        assert_eq!(chunk_ranges(3, 0), vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn test_chunk_ranges_cover_everything() {
        let total = CHUNK_SIZE * 3 + 17;
        let ranges = chunk_ranges(total, CHUNK_SIZE);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges.first().unwrap().start, 0);
        assert_eq!(ranges.last().unwrap().end, total);
        assert!(ranges.windows(2).all(|w| w[0].end == w[1].start));
    }

    #[test]
    fn test_item_path() {
        let root = RemotePath::root();
        assert_eq!(
            item_path("d1", &root, "a.txt", "content"),
            "/drives/d1/root:/a.txt:/content"
        );

        let parent = RemotePath::new("/Archive/2026").unwrap();
        assert_eq!(
            item_path("d1", &parent, "a.txt", "createUploadSession"),
            "/drives/d1/root:/Archive/2026/a.txt:/createUploadSession"
        );
    }

    #[test]
    fn test_chunk_size_is_multiple_of_320k() {
        assert_eq!(CHUNK_SIZE % (320 * 1024), 0);
    }
}
