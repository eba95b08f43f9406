//! spsync Core - Domain types, ports and configuration
//!
//! This crate holds the hexagonal core of spsync:
//! - **Domain entities** - `SyncedFile`, `SyncJob`, `SyncError`, `SyncMapping`, `Tenant`
//! - **Port definitions** - `ISyncLedger`, `IRemoteStore`, `IRemoteConnector`,
//!   `IAuthenticator`, `IConfigStore`
//! - **Configuration** - YAML-backed settings and the `YamlConfigStore` adapter
//!
//! # Architecture
//!
//! The domain module has no I/O. Ports define the trait interfaces that the
//! adapter crates (`spsync-cache`, `spsync-graph`) implement, and the
//! orchestrator in `spsync-sync` depends only on these traits.

pub mod config;
pub mod domain;
pub mod ports;
