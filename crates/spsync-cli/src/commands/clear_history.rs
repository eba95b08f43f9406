//! Clear-history command - Forget file records and jobs
//!
//! The next sync of an affected mapping uploads every file again.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use spsync_core::ports::ISyncLedger;

use super::{parse_mapping, AppContext};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct ClearHistoryCommand {
    #[arg(long)]
    pub tenant: String,

    /// Only clear this mapping
    #[arg(long)]
    pub mapping: Option<String>,

    /// Confirm the deletion
    #[arg(long)]
    pub yes: bool,
}

impl ClearHistoryCommand {
    pub async fn execute(&self, context: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let tenant = context.tenant(&self.tenant)?;
        let mapping = parse_mapping(self.mapping.as_deref())?;

        let scope = match &mapping {
            Some(mapping) => format!("{}/{mapping}", tenant.id),
            None => tenant.id.to_string(),
        };
        if !self.yes {
            formatter.warn(&format!(
                "This forgets every synced file of {scope}; re-run with --yes to confirm"
            ));
            return Ok(());
        }

        let ledger = context.open_ledger().await?;
        let removed = ledger
            .clear_history(&tenant.id, mapping.as_ref())
            .await
            .context("Failed to clear history")?;
        info!(scope = %scope, removed, "History cleared");

        if format.is_json() {
            formatter.print_json(&serde_json::json!({ "scope": scope, "removed": removed }));
        } else {
            formatter.success(&format!("Cleared {removed} record(s) for {scope}"));
        }
        Ok(())
    }
}
