//! Site and document library lookup

use tracing::{debug, info};
use url::Url;

use spsync_core::ports::{Drive, Site};

use crate::client::GraphClient;
use crate::models::{GraphCollection, GraphDrive, GraphSite};
use crate::GraphError;

/// Builds the Graph lookup path for a site URL
///
/// `https://contoso.sharepoint.com` resolves to `/sites/contoso.sharepoint.com`
/// and `https://contoso.sharepoint.com/sites/Finance/` to
/// `/sites/contoso.sharepoint.com:/sites/Finance`.
pub fn site_lookup_path(site_url: &str) -> Result<String, GraphError> {
    let url = Url::parse(site_url)
        .map_err(|e| GraphError::InvalidResponse(format!("invalid site URL {site_url}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| GraphError::InvalidResponse(format!("site URL has no host: {site_url}")))?;

    let path = url.path().trim_end_matches('/');
    if path.is_empty() {
        Ok(format!("/sites/{host}"))
    } else {
        Ok(format!("/sites/{host}:{path}"))
    }
}

/// Resolves a SharePoint site URL to its Graph site
pub async fn resolve_site(client: &GraphClient, site_url: &str) -> Result<Site, GraphError> {
    let path = site_lookup_path(site_url)?;
    debug!(site_url, path = %path, "Resolving site");

    let site: GraphSite = client.get_json(&path).await.map_err(|e| match e {
        GraphError::NotFound(_) => GraphError::NotFound(format!("site not found: {site_url}")),
        other => other,
    })?;

    info!(site_url, site_id = %site.id, "Resolved site");
    Ok(site.into())
}

/// Lists every document library of a site, following pagination
pub async fn list_libraries(client: &GraphClient, site_id: &str) -> Result<Vec<Drive>, GraphError> {
    let mut drives = Vec::new();
    let mut page: GraphCollection<GraphDrive> =
        client.get_json(&format!("/sites/{site_id}/drives")).await?;

    loop {
        drives.extend(page.value.into_iter().map(Drive::from));
        match page.next_link {
            Some(next) => page = client.get_json_url(&next).await?,
            None => break,
        }
    }

    Ok(drives)
}

/// Finds a library by name, ignoring case
pub async fn resolve_library(
    client: &GraphClient,
    site_id: &str,
    name: &str,
) -> Result<Drive, GraphError> {
    let drives = list_libraries(client, site_id).await?;
    debug!(site_id, count = drives.len(), "Listed libraries");

    drives
        .into_iter()
        .find(|d| d.name.to_lowercase() == name.to_lowercase())
        .ok_or_else(|| GraphError::NotFound(format!("library '{name}' not found in site {site_id}")))
}
