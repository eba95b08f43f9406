//! Graph API wire types
//!
//! Only the fields spsync reads are modelled; everything else in the JSON is
//! ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use spsync_core::ports::{Drive, RemoteItem, Site};

/// A `driveItem` resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDriveItem {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
    pub web_url: Option<String>,
    pub last_modified_date_time: Option<DateTime<Utc>>,
    /// Present if the item is a folder
    pub folder: Option<serde_json::Value>,
    /// Present if the item is a file
    pub file: Option<serde_json::Value>,
}

impl From<GraphDriveItem> for RemoteItem {
    fn from(item: GraphDriveItem) -> Self {
        RemoteItem {
            is_folder: item.folder.is_some(),
            id: item.id,
            name: item.name,
            size: item.size.unwrap_or(0),
            web_url: item.web_url,
            last_modified: item.last_modified_date_time,
        }
    }
}

/// A `site` resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSite {
    pub id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub web_url: Option<String>,
}

impl From<GraphSite> for Site {
    fn from(site: GraphSite) -> Self {
        Site {
            name: site
                .display_name
                .or(site.name)
                .unwrap_or_else(|| site.id.clone()),
            id: site.id,
            web_url: site.web_url,
        }
    }
}

/// A `drive` resource (document library)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDrive {
    pub id: String,
    pub name: String,
    pub web_url: Option<String>,
}

impl From<GraphDrive> for Drive {
    fn from(drive: GraphDrive) -> Self {
        Drive {
            id: drive.id,
            name: drive.name,
            web_url: drive.web_url,
        }
    }
}

/// A paged collection response
#[derive(Debug, Deserialize)]
pub struct GraphCollection<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Response from `createUploadSession`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionResponse {
    pub upload_url: String,
}

/// Error envelope returned by Graph on non-success statuses
#[derive(Debug, Deserialize)]
pub struct GraphErrorEnvelope {
    pub error: GraphErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct GraphErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}
