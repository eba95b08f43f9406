//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for identifiers and values. Each newtype checks
//! its invariants at construction time so the rest of the crate can rely
//! on them.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// Configuration-owned identifiers
// ============================================================================

/// Returns true if `s` is a usable configuration identifier
///
/// Identifiers are short slugs: ASCII alphanumerics plus `-`, `_` and `.`.
fn is_valid_slug(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 128
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Identifier of a tenant as declared in the configuration store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Create a new TenantId
    ///
    /// # Errors
    /// Returns error if the identifier is empty or contains characters
    /// outside `[A-Za-z0-9._-]`
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if !is_valid_slug(&id) {
            return Err(DomainError::InvalidId(format!("Invalid tenant id: '{id}'")));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TenantId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

/// Identifier of a mapping, unique within its tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MappingId(String);

impl MappingId {
    /// Create a new MappingId
    ///
    /// # Errors
    /// Returns error if the identifier is empty or contains characters
    /// outside `[A-Za-z0-9._-]`
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if !is_valid_slug(&id) {
            return Err(DomainError::InvalidId(format!("Invalid mapping id: '{id}'")));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MappingId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MappingId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for MappingId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MappingId> for String {
    fn from(id: MappingId) -> Self {
        id.0
    }
}

// ============================================================================
// JobId
// ============================================================================

/// Identifier for SyncJob entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random JobId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a JobId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid JobId: {e}")))
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// ContentHash
// ============================================================================

/// Hex-encoded SHA-256 digest of a file's content
///
/// This is the change-detection key. It is independent of timestamps, so a
/// copy that preserves content but touches mtime is not re-uploaded, and an
/// edit that keeps mtime is still detected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Length of a hex-encoded SHA-256 digest
    pub const HEX_LEN: usize = 64;

    /// Create a new ContentHash
    ///
    /// Upper-case input is normalised to lower case.
    ///
    /// # Errors
    /// Returns error if the value is not 64 hexadecimal characters
    pub fn new(hash: impl Into<String>) -> Result<Self, DomainError> {
        let hash = hash.into();
        if hash.len() != Self::HEX_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidHash(format!(
                "Expected {} hex characters, got '{hash}'",
                Self::HEX_LEN
            )));
        }
        Ok(Self(hash.to_ascii_lowercase()))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

// ============================================================================
// RemotePath
// ============================================================================

/// A drive-relative remote path (must start with /)
///
/// Represents paths inside a document library, e.g. "/Archive/2026/report.pdf".
/// The root of the library is "/".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    /// Create a new RemotePath
    ///
    /// # Errors
    /// Returns error if the path doesn't start with `/`, contains empty
    /// segments or contains a `..` segment
    pub fn new(path: impl Into<String>) -> Result<Self, DomainError> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path must start with '/': {path}"
            )));
        }

        if path.len() > 1 {
            if path.contains("//") || path.ends_with('/') {
                return Err(DomainError::InvalidRemotePath(format!(
                    "Remote path contains empty segments: {path}"
                )));
            }
            if path[1..].split('/').any(|seg| seg == "..") {
                return Err(DomainError::InvalidRemotePath(format!(
                    "Remote path contains invalid traversal: {path}"
                )));
            }
        }

        Ok(Self(path))
    }

    /// Builds a RemotePath from a loosely formatted string
    ///
    /// Backslashes become slashes, empty and `.` segments are dropped, and a
    /// leading slash is added. `""`, `"/"` and `"."` all map to the root.
    ///
    /// # Errors
    /// Returns error if a `..` segment is present
    pub fn normalize(raw: &str) -> Result<Self, DomainError> {
        let replaced = raw.replace('\\', "/");
        let segments: Vec<&str> = replaced
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        if segments.is_empty() {
            return Ok(Self::root());
        }
        Self::new(format!("/{}", segments.join("/")))
    }

    /// Create the root path "/"
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Returns true if this is the library root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments, excluding the leading root
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Join a path component
    ///
    /// # Errors
    /// Returns error if component is empty, contains `/` or is `..`
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        if component.is_empty() || component.contains('/') || component == ".." {
            return Err(DomainError::InvalidRemotePath(format!(
                "Invalid path component: {component}"
            )));
        }

        let new_path = if self.is_root() {
            format!("/{component}")
        } else {
            format!("{}/{component}", self.0)
        };

        Self::new(new_path)
    }

    /// Get the parent path
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }

        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Get the file name component
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }

        self.0.rsplit('/').next()
    }
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RemotePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RemotePath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}
