//! Folder creation along a drive path

use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};

use spsync_core::domain::RemotePath;

use crate::client::GraphClient;
use crate::models::GraphDriveItem;
use crate::sanitize::sanitize_path;
use crate::GraphError;

/// Makes sure every folder along `path` exists, returning the deepest one
///
/// Segments are sanitized first. Existing folders are reused; missing ones
/// are created with `conflictBehavior=fail`, so a folder created concurrently
/// by someone else surfaces as [`GraphError::Conflict`]. A file sitting where
/// a folder is expected is also a conflict.
pub async fn ensure_folder(
    client: &GraphClient,
    drive_id: &str,
    path: &RemotePath,
) -> Result<GraphDriveItem, GraphError> {
    let mut current: GraphDriveItem = client.get_json(&format!("/drives/{drive_id}/root")).await?;

    let path = sanitize_path(path);
    let mut walked = RemotePath::root();

    for segment in path.segments() {
        walked = walked
            .join(segment)
            .map_err(|e| GraphError::InvalidResponse(e.to_string()))?;

        let lookup = format!("/drives/{drive_id}/root:{}", walked.as_str());
        match client.get_json::<GraphDriveItem>(&lookup).await {
            Ok(item) if item.folder.is_some() => {
                debug!(path = %walked, id = %item.id, "Folder exists");
                current = item;
            }
            Ok(_) => {
                return Err(GraphError::Conflict(format!(
                    "a file exists where a folder is expected: {walked}"
                )));
            }
            Err(GraphError::NotFound(_)) => {
                current = create_child_folder(client, drive_id, &current.id, segment).await?;
                info!(path = %walked, id = %current.id, "Created folder");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(current)
}

async fn create_child_folder(
    client: &GraphClient,
    drive_id: &str,
    parent_id: &str,
    name: &str,
) -> Result<GraphDriveItem, GraphError> {
    let body = json!({
        "name": name,
        "folder": {},
        "@microsoft.graph.conflictBehavior": "fail",
    });

    client
        .send_json(
            Method::POST,
            &format!("/drives/{drive_id}/items/{parent_id}/children"),
            &body,
        )
        .await
}
