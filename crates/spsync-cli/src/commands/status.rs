//! Status command - Ledger statistics for a tenant

use anyhow::{Context, Result};
use clap::Args;

use spsync_core::ports::ISyncLedger;

use super::{format_bytes, AppContext};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Tenant to report on
    #[arg(long)]
    pub tenant: String,
}

impl StatusCommand {
    pub async fn execute(&self, context: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let tenant = context.tenant(&self.tenant)?;
        let ledger = context.open_ledger().await?;

        let stats = ledger
            .get_stats(&tenant.id)
            .await
            .context("Failed to read ledger statistics")?;

        if format.is_json() {
            let mut value = serde_json::to_value(&stats)?;
            value["tenant"] = serde_json::json!(tenant.id.as_str());
            formatter.print_json(&value);
            return Ok(());
        }

        formatter.success(&format!("spsync status - {}", tenant.display_name()));
        match stats.last_sync {
            Some(time) => formatter.info(&format!(
                "Last sync: {}",
                time.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            None => formatter.info("Last sync: Never"),
        }
        formatter.info(&format!("Synced data: {}", format_bytes(stats.synced_bytes)));

        formatter.section("Status        Files");
        formatter.info("------------- -----");
        for (label, count) in [
            ("Synced", stats.synced),
            ("Failed", stats.failed),
            ("Pending", stats.pending),
            ("Syncing", stats.syncing),
            ("Deleted", stats.deleted),
        ] {
            if count > 0 {
                formatter.info(&format!("{label:<13} {count}"));
            }
        }
        formatter.info(&format!("{:<13} {}", "Total", stats.total_files));

        if stats.failed > 0 {
            formatter.warn(&format!(
                "{} file(s) failed; run 'spsync failed --tenant {}' for details",
                stats.failed, tenant.id
            ));
        }
        Ok(())
    }
}
