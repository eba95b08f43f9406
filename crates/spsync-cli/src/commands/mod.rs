//! CLI subcommands and the adapter wiring they share

pub mod auth;
pub mod clear_history;
pub mod failed;
pub mod jobs;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use spsync_cache::{DatabasePool, SqliteSyncLedger};
use spsync_core::config::{Config, YamlConfigStore};
use spsync_core::domain::{MappingId, Tenant, TenantId};
use spsync_graph::auth::{ClientCredentialsFlow, TokenCache};
use spsync_graph::provider::GraphConnector;
use spsync_sync::engine::SyncEngine;

/// Loaded configuration plus constructors for the adapters
pub struct AppContext {
    config_path: PathBuf,
    store: Arc<YamlConfigStore>,
}

impl AppContext {
    /// Loads and validates the config file, or the default location
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Config::default_path);
        let store = YamlConfigStore::load(&config_path)?;
        Ok(Self {
            config_path,
            store: Arc::new(store),
        })
    }

    pub fn config(&self) -> &Config {
        self.store.config()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn tenant(&self, id: &str) -> Result<&Tenant> {
        let id = TenantId::new(id).context("Invalid tenant id")?;
        self.config().tenant(&id).with_context(|| {
            format!(
                "Tenant '{id}' is not configured in {}",
                self.config_path.display()
            )
        })
    }

    /// Opens the SQLite ledger configured under `ledger.path`
    pub async fn open_ledger(&self) -> Result<Arc<SqliteSyncLedger>> {
        let path = self.config().ledger.resolved_path();
        let pool = DatabasePool::new(&path)
            .await
            .with_context(|| format!("Failed to open ledger at {}", path.display()))?;
        Ok(Arc::new(SqliteSyncLedger::new(pool.pool().clone())))
    }

    /// Client-credentials token cache against the configured authority
    pub fn authenticator(&self) -> Result<Arc<TokenCache>> {
        let flow = ClientCredentialsFlow::new(self.config().graph.authority_url.clone())
            .context("Failed to build token client")?;
        Ok(Arc::new(TokenCache::new(flow)))
    }

    pub async fn engine(&self) -> Result<SyncEngine> {
        let ledger = self.open_ledger().await?;
        let connector = GraphConnector::new(self.authenticator()?, (&self.config().graph).into());
        Ok(SyncEngine::new(
            self.store.clone(),
            ledger,
            Arc::new(connector),
        ))
    }
}

/// Parses an optional `--mapping` value
pub fn parse_mapping(mapping: Option<&str>) -> Result<Option<MappingId>> {
    mapping
        .map(|m| MappingId::new(m).context("Invalid mapping id"))
        .transpose()
}

/// `1536` -> `1.5 KiB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn plural(n: u64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
