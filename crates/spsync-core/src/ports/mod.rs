//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ISyncLedger`] - Durable per-file records and per-run jobs (SQLite)
//! - [`IRemoteStore`] / [`IRemoteConnector`] - Document library operations (Graph)
//! - [`IAuthenticator`] - Bearer tokens per tenant
//! - [`IConfigStore`] - Tenants and mappings

pub mod authenticator;
pub mod config_store;
pub mod ledger;
pub mod remote_store;

pub use authenticator::{AccessToken, AuthError, IAuthenticator};
pub use config_store::IConfigStore;
pub use ledger::{ISyncLedger, LedgerStats, StorageError};
pub use remote_store::{
    Drive, IRemoteConnector, IRemoteStore, RemoteError, RemoteItem, Site, UploadContent,
    UploadProgressFn,
};
