//! Configuration store port (driving/primary port)
//!
//! Read-only access to tenants and their mappings. Uses `anyhow::Result`
//! because failures are adapter-specific (file, registry, remote service).

use crate::domain::{MappingId, SyncMapping, Tenant, TenantId};

/// Port trait for reading tenants and mappings
#[async_trait::async_trait]
pub trait IConfigStore: Send + Sync {
    /// All configured tenants, enabled or not, in declaration order
    async fn list_tenants(&self) -> anyhow::Result<Vec<Tenant>>;

    async fn get_tenant(&self, id: &TenantId) -> anyhow::Result<Option<Tenant>>;

    /// Mappings of a tenant, empty if the tenant is unknown
    async fn get_mappings(&self, tenant: &TenantId) -> anyhow::Result<Vec<SyncMapping>>;

    async fn get_mapping(
        &self,
        tenant: &TenantId,
        mapping: &MappingId,
    ) -> anyhow::Result<Option<SyncMapping>>;
}
