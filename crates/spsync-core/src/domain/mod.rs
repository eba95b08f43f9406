//! Domain entities and business logic
//!
//! This module contains the core domain types for spsync:
//! - Newtypes for identifiers, content digests and remote paths
//! - Ledger records for synced files
//! - Sync jobs with their counters and errors
//! - Tenants and mappings owned by the configuration store
//! - Domain-specific error types

pub mod errors;
pub mod job;
pub mod mapping;
pub mod newtypes;
pub mod synced_file;

// Re-export commonly used types
pub use errors::DomainError;
pub use job::{JobCounters, JobStatus, SyncError, SyncJob};
pub use mapping::{ConflictBehavior, SyncMapping, Tenant};
pub use newtypes::*;
pub use synced_file::{FileStatus, SyncedFile};
