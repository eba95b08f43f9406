//! Failed command - Files whose last upload failed
//!
//! Failed files are retried automatically by the next sync of their mapping.

use anyhow::{Context, Result};
use clap::Args;

use spsync_core::ports::ISyncLedger;

use super::{parse_mapping, plural, AppContext};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct FailedCommand {
    #[arg(long)]
    pub tenant: String,

    /// Narrow to one mapping
    #[arg(long)]
    pub mapping: Option<String>,
}

impl FailedCommand {
    pub async fn execute(&self, context: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let tenant = context.tenant(&self.tenant)?;
        let mapping = parse_mapping(self.mapping.as_deref())?;
        let ledger = context.open_ledger().await?;

        let files = ledger
            .get_failed_files(&tenant.id, mapping.as_ref())
            .await
            .context("Failed to query failed files")?;

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&files)?);
            return Ok(());
        }
        if files.is_empty() {
            formatter.success("No failed files");
            return Ok(());
        }

        formatter.error(&format!("{} failed file{}:", files.len(), plural(files.len() as u64)));
        for file in &files {
            formatter.info(&format!(
                "[{}] {} - {}",
                file.mapping_id,
                file.local_path,
                file.error_message.as_deref().unwrap_or("unknown error")
            ));
        }
        formatter.info("These files are retried on the next sync.");
        Ok(())
    }
}
