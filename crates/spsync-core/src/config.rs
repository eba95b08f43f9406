//! Configuration module for spsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! [`YamlConfigStore`] exposes a loaded configuration through [`IConfigStore`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::{MappingId, SyncMapping, Tenant, TenantId};
use crate::ports::IConfigStore;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for spsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub graph: GraphConfig,
    pub logging: LoggingConfig,
    pub tenants: Vec<Tenant>,
}

/// Sync ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite database file. A leading `~/` is expanded at runtime.
    pub path: PathBuf,
}

/// Microsoft Graph client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Graph API root, without trailing slash.
    pub base_url: String,
    /// Identity platform root used to build the token endpoint.
    pub authority_url: String,
    /// Timeout applied to every HTTP request, in seconds.
    pub request_timeout_secs: u64,
    /// Attempts for a single request answered with 429 or 5xx.
    pub max_retries: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level: one of `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/spsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("spsync")
            .join("config.yaml")
    }

    /// Looks up a tenant by id.
    pub fn tenant(&self, id: &TenantId) -> Option<&Tenant> {
        self.tenants.iter().find(|t| &t.id == id)
    }
}

impl LedgerConfig {
    /// The database path with a leading `~/` replaced by the home directory.
    pub fn resolved_path(&self) -> PathBuf {
        expand_tilde(&self.path)
    }
}

/// Replaces a leading `~` component with the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for LedgerConfig {
    fn default() -> Self {
        let path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("spsync")
            .join("ledger.db");
        Self { path }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0".to_string(),
            authority_url: "https://login.microsoftonline.com".to_string(),
            request_timeout_secs: 60,
            max_retries: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"tenants[0].mappings[1].library"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

/// Upper bound for `max_concurrent_uploads`.
pub const MAX_CONCURRENT_UPLOADS: usize = 16;

fn push(errors: &mut Vec<ValidationError>, field: String, message: impl Into<String>) {
    errors.push(ValidationError {
        field,
        message: message.into(),
    });
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- graph ---
        for (field, value) in [
            ("graph.base_url", &self.graph.base_url),
            ("graph.authority_url", &self.graph.authority_url),
        ] {
            if url::Url::parse(value).is_err() {
                push(&mut errors, field.into(), format!("not a valid URL: {value}"));
            }
        }
        if self.graph.request_timeout_secs == 0 {
            push(
                &mut errors,
                "graph.request_timeout_secs".into(),
                "must be greater than 0",
            );
        }
        if self.graph.max_retries == 0 {
            push(&mut errors, "graph.max_retries".into(), "must be greater than 0");
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                &mut errors,
                "logging.level".into(),
                format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            push(
                &mut errors,
                "logging.format".into(),
                format!(
                    "invalid format '{}', expected one of: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            );
        }

        // --- tenants ---
        let mut tenant_ids = HashSet::new();
        for (ti, tenant) in self.tenants.iter().enumerate() {
            let prefix = format!("tenants[{ti}]");
            if !tenant_ids.insert(&tenant.id) {
                push(
                    &mut errors,
                    format!("{prefix}.id"),
                    format!("duplicate tenant id '{}'", tenant.id),
                );
            }
            for (field, value) in [
                ("directory_id", &tenant.directory_id),
                ("client_id", &tenant.client_id),
                ("client_secret_env", &tenant.client_secret_env),
            ] {
                if value.trim().is_empty() {
                    push(&mut errors, format!("{prefix}.{field}"), "must not be empty");
                }
            }

            let mut mapping_ids = HashSet::new();
            for (mi, mapping) in tenant.mappings.iter().enumerate() {
                let prefix = format!("{prefix}.mappings[{mi}]");
                if !mapping_ids.insert(&mapping.id) {
                    push(
                        &mut errors,
                        format!("{prefix}.id"),
                        format!("duplicate mapping id '{}'", mapping.id),
                    );
                }
                validate_mapping(mapping, &prefix, &mut errors);
            }
        }

        errors
    }
}

fn validate_mapping(mapping: &SyncMapping, prefix: &str, errors: &mut Vec<ValidationError>) {
    if mapping.source_path.as_os_str().is_empty() {
        push(errors, format!("{prefix}.source_path"), "must not be empty");
    }
    if mapping.library.trim().is_empty() {
        push(errors, format!("{prefix}.library"), "must not be empty");
    }

    match url::Url::parse(&mapping.site_url) {
        Ok(url) if url.scheme() == "https" && url.host_str().is_some() => {}
        Ok(_) => push(
            errors,
            format!("{prefix}.site_url"),
            format!("must be an https URL: {}", mapping.site_url),
        ),
        Err(_) => push(
            errors,
            format!("{prefix}.site_url"),
            format!("not a valid URL: '{}'", mapping.site_url),
        ),
    }

    if let Err(e) = mapping.destination_root() {
        push(errors, format!("{prefix}.folder"), e.to_string());
    }

    for (field, patterns) in [("include", &mapping.include), ("exclude", &mapping.exclude)] {
        for pattern in patterns {
            if let Err(e) = glob::Pattern::new(pattern) {
                push(
                    errors,
                    format!("{prefix}.{field}"),
                    format!("invalid glob '{pattern}': {e}"),
                );
            }
        }
    }

    if let (Some(min), Some(max)) = (mapping.min_size, mapping.max_size) {
        if min > max {
            push(
                errors,
                format!("{prefix}.min_size"),
                format!("min_size ({min}) must not exceed max_size ({max})"),
            );
        }
    }

    if mapping.max_concurrent_uploads == 0 || mapping.max_concurrent_uploads > MAX_CONCURRENT_UPLOADS
    {
        push(
            errors,
            format!("{prefix}.max_concurrent_uploads"),
            format!("must be between 1 and {MAX_CONCURRENT_UPLOADS}"),
        );
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for constructing a [`Config`] programmatically.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ledger.path = path.into();
        self
    }

    pub fn graph_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.graph.base_url = url.into();
        self
    }

    pub fn graph_authority_url(mut self, url: impl Into<String>) -> Self {
        self.config.graph.authority_url = url.into();
        self
    }

    pub fn graph_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.graph.request_timeout_secs = seconds;
        self
    }

    pub fn graph_max_retries(mut self, n: u32) -> Self {
        self.config.graph.max_retries = n;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    /// Append a tenant.
    pub fn tenant(mut self, tenant: Tenant) -> Self {
        self.config.tenants.push(tenant);
        self
    }

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// YamlConfigStore
// ---------------------------------------------------------------------------

/// [`IConfigStore`] backed by a configuration loaded from YAML.
#[derive(Debug, Clone)]
pub struct YamlConfigStore {
    config: Config,
}

impl YamlConfigStore {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Load and validate the file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = Config::load(path)?;
        let errors = config.validate();
        if !errors.is_empty() {
            let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
            anyhow::bail!(
                "invalid configuration in {}:\n  {}",
                path.display(),
                details.join("\n  ")
            );
        }
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait::async_trait]
impl IConfigStore for YamlConfigStore {
    async fn list_tenants(&self) -> anyhow::Result<Vec<Tenant>> {
        Ok(self.config.tenants.clone())
    }

    async fn get_tenant(&self, id: &TenantId) -> anyhow::Result<Option<Tenant>> {
        Ok(self.config.tenant(id).cloned())
    }

    async fn get_mappings(&self, tenant: &TenantId) -> anyhow::Result<Vec<SyncMapping>> {
        Ok(self
            .config
            .tenant(tenant)
            .map(|t| t.mappings.clone())
            .unwrap_or_default())
    }

    async fn get_mapping(
        &self,
        tenant: &TenantId,
        mapping: &MappingId,
    ) -> anyhow::Result<Option<SyncMapping>> {
        Ok(self
            .config
            .tenant(tenant)
            .and_then(|t| t.mapping(mapping))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
