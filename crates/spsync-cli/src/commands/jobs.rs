//! Jobs command - Recent sync jobs, newest first

use anyhow::{Context, Result};
use clap::Args;

use spsync_core::ports::ISyncLedger;

use super::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct JobsCommand {
    /// Only list jobs of this tenant
    #[arg(long)]
    pub tenant: Option<String>,

    /// Maximum number of jobs to list
    #[arg(long, default_value_t = 10)]
    pub limit: u32,
}

impl JobsCommand {
    pub async fn execute(&self, context: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let tenant = self
            .tenant
            .as_deref()
            .map(|t| context.tenant(t).map(|t| t.id.clone()))
            .transpose()?;
        let ledger = context.open_ledger().await?;

        let jobs = ledger
            .get_recent_jobs(tenant.as_ref(), self.limit)
            .await
            .context("Failed to list jobs")?;

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&jobs)?);
            return Ok(());
        }
        if jobs.is_empty() {
            formatter.info("No sync jobs recorded");
            return Ok(());
        }

        formatter.info("Started              Status     Target                     Files     Failed");
        for job in &jobs {
            let target = match job.mapping_id() {
                Some(mapping) => format!("{}/{mapping}", job.tenant_id()),
                None => job.tenant_id().to_string(),
            };
            let counters = job.counters();
            formatter.info(&format!(
                "{:<20} {:<10} {:<26} {:>4}/{:<4} {}",
                job.started_at().format("%Y-%m-%d %H:%M:%S"),
                job.status().as_str(),
                target,
                counters.files_processed,
                counters.files_total,
                counters.files_failed
            ));
        }
        Ok(())
    }
}
