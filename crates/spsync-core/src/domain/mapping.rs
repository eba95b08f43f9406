//! Tenants and sync mappings
//!
//! These are owned by the configuration store and read-only for the engine.
//! Field defaults are applied at deserialization time.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{MappingId, RemotePath, TenantId};

/// What the remote does when an uploaded name already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictBehavior {
    /// Overwrite the existing item
    #[default]
    Replace,
    /// Keep both, the remote picks a new name
    Rename,
    /// Reject the upload
    Fail,
}

impl ConflictBehavior {
    /// Value of `@microsoft.graph.conflictBehavior`
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictBehavior::Replace => "replace",
            ConflictBehavior::Rename => "rename",
            ConflictBehavior::Fail => "fail",
        }
    }
}

impl fmt::Display for ConflictBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictBehavior {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(ConflictBehavior::Replace),
            "rename" => Ok(ConflictBehavior::Rename),
            "fail" => Ok(ConflictBehavior::Fail),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown conflict behavior: {other}"
            ))),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_uploads() -> usize {
    1
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// A local directory bound to a destination in a document library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMapping {
    pub id: MappingId,
    #[serde(default)]
    pub name: String,
    pub source_path: PathBuf,
    pub site_url: String,
    pub library: String,
    /// Destination folder inside the library, `None` for the library root
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub min_size: Option<u64>,
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub preserve_folder_structure: bool,
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub conflict_behavior: ConflictBehavior,
}

impl SyncMapping {
    /// Creates a mapping with default options
    pub fn new(
        id: MappingId,
        source_path: impl Into<PathBuf>,
        site_url: impl Into<String>,
        library: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: String::new(),
            source_path: source_path.into(),
            site_url: site_url.into(),
            library: library.into(),
            folder: None,
            include: Vec::new(),
            exclude: Vec::new(),
            min_size: None,
            max_size: None,
            enabled: true,
            preserve_folder_structure: true,
            max_concurrent_uploads: default_max_concurrent_uploads(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            conflict_behavior: ConflictBehavior::default(),
        }
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }

    /// Destination folder as a drive-relative path
    ///
    /// # Errors
    /// Returns error if the configured folder contains a `..` segment
    pub fn destination_root(&self) -> Result<RemotePath, DomainError> {
        RemotePath::normalize(self.folder.as_deref().unwrap_or(""))
    }
}

/// An Azure AD tenant with app-only credentials and its mappings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    #[serde(default)]
    pub name: String,
    /// Azure AD directory (tenant) id used in the token endpoint
    pub directory_id: String,
    pub client_id: String,
    /// Name of the environment variable holding the client secret
    pub client_secret_env: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mappings: Vec<SyncMapping>,
}

impl Tenant {
    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }

    /// Mappings with `enabled: true`, in declaration order
    pub fn enabled_mappings(&self) -> impl Iterator<Item = &SyncMapping> {
        self.mappings.iter().filter(|m| m.enabled)
    }

    /// Looks up a mapping by id
    pub fn mapping(&self, id: &MappingId) -> Option<&SyncMapping> {
        self.mappings.iter().find(|m| &m.id == id)
    }
}
