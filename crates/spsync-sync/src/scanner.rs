//! Local source scanner
//!
//! Walks a mapping's source directory and produces a [`ScanResult`]: every
//! accepted regular file with its SHA-256 digest, plus every directory seen.
//!
//! - Entries are visited in name order within each directory, so two scans of
//!   an unchanged tree produce identical inventories.
//! - Symbolic links are never followed.
//! - Unreadable files and directories are logged and skipped.
//! - Glob patterns match the `/`-separated relative path and the bare file
//!   name. Against the path, `*` and `?` stop at `/` and only `**` spans
//!   directories. An exclude match always wins over an include match.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use spsync_core::domain::{ContentHash, SyncMapping};

use crate::ScanError;

/// Read buffer for hashing: 64 KiB
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// A file accepted by the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the scan root, `/`-separated
    pub relative_path: String,
    pub name: String,
    pub size: u64,
    pub hash: ContentHash,
    pub created: Option<DateTime<Utc>>,
    pub modified: DateTime<Utc>,
    pub is_directory: bool,
}

/// Inventory of one scan
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub files: Vec<ScannedFile>,
    /// Relative paths of every directory below the root
    pub directories: Vec<String>,
    pub total_size: u64,
    pub scanned_at: DateTime<Utc>,
}

/// Called once per accepted file
pub type ScanCallback<'a> = dyn Fn(&ScannedFile) + Send + Sync + 'a;

// ============================================================================
// Filters
// ============================================================================

const PATH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Size and glob filters compiled from a mapping
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    min_size: Option<u64>,
    max_size: Option<u64>,
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, ScanError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| ScanError::Pattern {
                pattern: p.clone(),
                message: e.msg.to_string(),
            })
        })
        .collect()
}

impl ScanFilter {
    pub fn from_mapping(mapping: &SyncMapping) -> Result<Self, ScanError> {
        Ok(Self {
            include: compile(&mapping.include)?,
            exclude: compile(&mapping.exclude)?,
            min_size: mapping.min_size,
            max_size: mapping.max_size,
        })
    }

    fn matches_any(patterns: &[Pattern], relative_path: &str, name: &str) -> bool {
        patterns
            .iter()
            .any(|p| p.matches_with(relative_path, PATH_MATCH) || p.matches(name))
    }

    /// Returns true if a file with this path and size should be synced
    pub fn accepts(&self, relative_path: &str, name: &str, size: u64) -> bool {
        if self.min_size.is_some_and(|min| size < min) {
            return false;
        }
        if self.max_size.is_some_and(|max| size > max) {
            return false;
        }
        if Self::matches_any(&self.exclude, relative_path, name) {
            return false;
        }
        self.include.is_empty() || Self::matches_any(&self.include, relative_path, name)
    }
}

// ============================================================================
// Hashing
// ============================================================================

/// Streams a file through SHA-256 and returns the lower-case hex digest
pub async fn hash_file(path: &Path) -> std::io::Result<ContentHash> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let hex: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    ContentHash::new(hex).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

// ============================================================================
// Walk
// ============================================================================

/// Scans the mapping's source directory
///
/// # Errors
/// [`ScanError::Path`] if the source is missing or not a directory and
/// [`ScanError::Pattern`] if a filter does not compile. Problems with
/// individual entries never fail the scan.
pub async fn scan(
    mapping: &SyncMapping,
    on_file: Option<&ScanCallback<'_>>,
) -> Result<ScanResult, ScanError> {
    let root = mapping.source_path.as_path();
    let is_dir = tokio::fs::metadata(root)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(ScanError::Path(root.to_path_buf()));
    }

    let filter = ScanFilter::from_mapping(mapping)?;
    let mut result = ScanResult {
        files: Vec::new(),
        directories: Vec::new(),
        total_size: 0,
        scanned_at: Utc::now(),
    };

    let walker = Walker {
        filter: &filter,
        on_file,
    };
    walker.walk(root, "", &mut result).await;

    info!(
        mapping = %mapping.id,
        files = result.files.len(),
        directories = result.directories.len(),
        bytes = result.total_size,
        "Scan finished"
    );
    Ok(result)
}

struct Walker<'a> {
    filter: &'a ScanFilter,
    on_file: Option<&'a ScanCallback<'a>>,
}

fn join_relative(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

impl<'a> Walker<'a> {
    fn walk<'b>(
        &'b self,
        dir: &'b Path,
        prefix: &'b str,
        result: &'b mut ScanResult,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'b>> {
        Box::pin(async move {
            let mut reader = match tokio::fs::read_dir(dir).await {
                Ok(reader) => reader,
                Err(err) => {
                    warn!(path = %dir.display(), %err, "Skipping unreadable directory");
                    return;
                }
            };

            let mut entries = Vec::new();
            loop {
                match reader.next_entry().await {
                    Ok(Some(entry)) => entries.push(entry),
                    Ok(None) => break,
                    Err(err) => {
                        warn!(path = %dir.display(), %err, "Error while listing directory");
                        break;
                    }
                }
            }
            entries.sort_by_key(|e| e.file_name());

            for entry in entries {
                let path = entry.path();
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    warn!(path = %path.display(), "Skipping entry with non UTF-8 name");
                    continue;
                };
                let relative = join_relative(prefix, &name);

                // file_type() does not follow symlinks
                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(err) => {
                        warn!(path = %path.display(), %err, "Skipping unreadable entry");
                        continue;
                    }
                };

                if file_type.is_symlink() {
                    debug!(path = %path.display(), "Skipping symbolic link");
                } else if file_type.is_dir() {
                    result.directories.push(relative.clone());
                    self.walk(&path, &relative, result).await;
                } else if file_type.is_file() {
                    if let Some(file) = self.visit_file(&path, relative, name).await {
                        if let Some(callback) = self.on_file {
                            callback(&file);
                        }
                        result.total_size += file.size;
                        result.files.push(file);
                    }
                }
            }
        })
    }

    async fn visit_file(&self, path: &Path, relative: String, name: String) -> Option<ScannedFile> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(err) => {
                warn!(path = %path.display(), %err, "Skipping unreadable file");
                return None;
            }
        };

        let size = metadata.len();
        if !self.filter.accepts(&relative, &name, size) {
            debug!(path = %relative, size, "Filtered out");
            return None;
        }

        let hash = match hash_file(path).await {
            Ok(hash) => hash,
            Err(err) => {
                warn!(path = %path.display(), %err, "Skipping file that could not be hashed");
                return None;
            }
        };

        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let created = metadata.created().ok().map(DateTime::<Utc>::from);

        Some(ScannedFile {
            path: path.to_path_buf(),
            relative_path: relative,
            name,
            size,
            hash,
            created,
            modified,
            is_directory: false,
        })
    }
}
