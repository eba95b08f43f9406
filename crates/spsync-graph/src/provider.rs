//! Graph adapters for the remote-store ports
//!
//! [`GraphRemoteStore`] fulfils [`IRemoteStore`] for one tenant by delegating
//! to the sites, folders and upload modules. [`GraphConnector`] hands out one
//! store per tenant, all sharing a single token cache.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use spsync_core::domain::{ConflictBehavior, RemotePath, Tenant, TenantId};
use spsync_core::ports::{
    Drive, IAuthenticator, IRemoteConnector, IRemoteStore, RemoteError, RemoteItem, Site,
    UploadContent, UploadProgressFn,
};

use crate::client::{GraphClient, GraphClientOptions};
use crate::upload::UploadOptions;
use crate::{folders, sites, upload};

/// `IRemoteStore` backed by Microsoft Graph
pub struct GraphRemoteStore {
    client: GraphClient,
    upload_options: UploadOptions,
}

impl GraphRemoteStore {
    pub fn new(client: GraphClient, upload_options: UploadOptions) -> Self {
        Self {
            client,
            upload_options,
        }
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }
}

#[async_trait::async_trait]
impl IRemoteStore for GraphRemoteStore {
    async fn resolve_site(&self, site_url: &str) -> Result<Site, RemoteError> {
        Ok(sites::resolve_site(&self.client, site_url).await?)
    }

    async fn resolve_library(&self, site_id: &str, name: &str) -> Result<Drive, RemoteError> {
        Ok(sites::resolve_library(&self.client, site_id, name).await?)
    }

    async fn ensure_folder(
        &self,
        drive_id: &str,
        path: &RemotePath,
    ) -> Result<RemoteItem, RemoteError> {
        Ok(folders::ensure_folder(&self.client, drive_id, path)
            .await?
            .into())
    }

    async fn upload_file(
        &self,
        drive_id: &str,
        parent: &RemotePath,
        name: &str,
        content: UploadContent,
        conflict: ConflictBehavior,
        on_progress: Option<&UploadProgressFn<'_>>,
    ) -> Result<RemoteItem, RemoteError> {
        let item = upload::upload_file(
            &self.client,
            &self.upload_options,
            drive_id,
            parent,
            name,
            content,
            conflict,
            on_progress,
        )
        .await?;
        Ok(item.into())
    }
}

/// `IRemoteConnector` creating one [`GraphRemoteStore`] per tenant
pub struct GraphConnector {
    auth: Arc<dyn IAuthenticator>,
    client_options: GraphClientOptions,
    upload_options: UploadOptions,
    stores: DashMap<TenantId, Arc<GraphRemoteStore>>,
}

impl GraphConnector {
    pub fn new(auth: Arc<dyn IAuthenticator>, client_options: GraphClientOptions) -> Self {
        Self {
            auth,
            client_options,
            upload_options: UploadOptions::default(),
            stores: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_upload_options(mut self, upload_options: UploadOptions) -> Self {
        self.upload_options = upload_options;
        self
    }
}

#[async_trait::async_trait]
impl IRemoteConnector for GraphConnector {
    async fn connect(&self, tenant: &Tenant) -> Result<Arc<dyn IRemoteStore>, RemoteError> {
        if let Some(store) = self.stores.get(&tenant.id) {
            return Ok(store.clone());
        }

        debug!(tenant = %tenant.id, "Creating Graph client");
        let client = GraphClient::new(
            tenant.clone(),
            Arc::clone(&self.auth),
            self.client_options.clone(),
        )?;
        let store = Arc::new(GraphRemoteStore::new(client, self.upload_options));
        let store = self
            .stores
            .entry(tenant.id.clone())
            .or_insert(store)
            .clone();
        Ok(store)
    }
}
