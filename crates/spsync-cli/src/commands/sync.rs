//! Sync command - Upload new and changed files
//!
//! `spsync sync` picks its targets from the flags:
//! - `--tenant T --mapping M`: one mapping
//! - `--tenant T`: every enabled mapping of the tenant
//! - neither: every enabled mapping of every enabled tenant
//!
//! With `--dry-run` the same targets are scanned and compared against the
//! ledger, without remote calls or ledger writes. Ctrl-C stops a run between
//! files; files already uploaded stay recorded.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::warn;

use spsync_core::domain::{JobStatus, MappingId, SyncJob, TenantId};
use spsync_sync::engine::{DryRunReport, SyncEngine, SyncPhase, SyncProgress};

use super::{format_bytes, parse_mapping, plural, AppContext};
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Only sync this tenant
    #[arg(long)]
    pub tenant: Option<String>,

    /// Only sync this mapping of the tenant
    #[arg(long, requires = "tenant")]
    pub mapping: Option<String>,

    /// Show what would be uploaded without making changes
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncCommand {
    pub async fn execute(&self, context: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let tenant = self
            .tenant
            .as_deref()
            .map(|t| context.tenant(t).map(|t| t.id.clone()))
            .transpose()?;
        let mapping = parse_mapping(self.mapping.as_deref())?;

        let mut engine = context.engine().await?;
        if !format.is_json() {
            engine = engine.with_progress(Arc::new(print_progress));
        }

        if self.dry_run {
            return self
                .dry_run(context, &engine, tenant.as_ref(), mapping.as_ref(), &*formatter, format)
                .await;
        }

        let cancel = engine.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current files");
                cancel.cancel();
            }
        });

        let jobs = match (&tenant, &mapping) {
            (Some(tenant), Some(mapping)) => vec![engine.sync_mapping(tenant, mapping).await?],
            (Some(tenant), None) => engine.sync_tenant(tenant).await?,
            _ => engine.sync_all().await?,
        };

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&jobs).context("Failed to encode jobs")?);
        } else if jobs.is_empty() {
            formatter.warn("No enabled mappings to sync");
        } else {
            for job in &jobs {
                print_job(job, &*formatter);
            }
        }

        let failed = jobs
            .iter()
            .filter(|j| j.status() == JobStatus::Failed)
            .count();
        if failed > 0 {
            bail!("{failed} sync job{} failed", plural(failed as u64));
        }
        Ok(())
    }

    async fn dry_run(
        &self,
        context: &AppContext,
        engine: &SyncEngine,
        tenant: Option<&TenantId>,
        mapping: Option<&MappingId>,
        formatter: &dyn OutputFormatter,
        format: OutputFormat,
    ) -> Result<()> {
        let mut targets: Vec<(TenantId, MappingId)> = Vec::new();
        for t in context.config().tenants.iter() {
            if tenant.map_or(!t.enabled, |id| &t.id != id) {
                continue;
            }
            for m in t.enabled_mappings() {
                if mapping.map_or(true, |id| &m.id == id) {
                    targets.push((t.id.clone(), m.id.clone()));
                }
            }
        }
        if let (Some(tenant), Some(mapping)) = (tenant, mapping) {
            if targets.is_empty() {
                targets.push((tenant.clone(), mapping.clone()));
            }
        }

        let mut reports = Vec::new();
        for (tenant, mapping) in targets {
            let report = engine.dry_run(&tenant, &mapping).await?;
            reports.push((tenant, mapping, report));
        }

        if format.is_json() {
            let value: Vec<_> = reports
                .iter()
                .map(|(tenant, mapping, report)| dry_run_json(tenant, mapping, report))
                .collect();
            formatter.print_json(&serde_json::Value::Array(value));
            return Ok(());
        }

        formatter.info("Dry run - no changes will be made");
        for (tenant, mapping, report) in &reports {
            formatter.section(&format!("{tenant}/{mapping}"));
            if report.files.is_empty() {
                formatter.success(&format!(
                    "Up to date ({} file{})",
                    report.up_to_date,
                    plural(report.up_to_date as u64)
                ));
                continue;
            }
            for file in &report.files {
                formatter.info(&format!("{} ({})", file.relative_path, format_bytes(file.size)));
            }
            formatter.info(&format!(
                "{} file{} to upload, {}; {} up to date",
                report.files.len(),
                plural(report.files.len() as u64),
                format_bytes(report.total_bytes),
                report.up_to_date
            ));
        }
        Ok(())
    }
}

fn dry_run_json(tenant: &TenantId, mapping: &MappingId, report: &DryRunReport) -> serde_json::Value {
    serde_json::json!({
        "tenant": tenant.as_str(),
        "mapping": mapping.as_str(),
        "files": report
            .files
            .iter()
            .map(|f| serde_json::json!({ "path": f.relative_path, "size": f.size }))
            .collect::<Vec<_>>(),
        "up_to_date": report.up_to_date,
        "total_bytes": report.total_bytes,
    })
}

fn print_progress(progress: SyncProgress) {
    if progress.phase != SyncPhase::Uploading {
        return;
    }
    if let Some(file) = &progress.current_file {
        println!(
            "  [{}/{}] {file}",
            progress.files_processed + 1,
            progress.files_total
        );
    }
}

fn print_job(job: &SyncJob, formatter: &dyn OutputFormatter) {
    let target = match job.mapping_id() {
        Some(mapping) => format!("{}/{mapping}", job.tenant_id()),
        None => job.tenant_id().to_string(),
    };
    let counters = job.counters();
    let summary = format!(
        "{target}: {} of {} file{} uploaded ({})",
        counters.files_processed,
        counters.files_total,
        plural(counters.files_total),
        format_bytes(counters.bytes_transferred)
    );

    match job.status() {
        JobStatus::Completed if counters.files_total == 0 => {
            formatter.success(&format!("{target}: already up to date"))
        }
        JobStatus::Completed => formatter.success(&summary),
        JobStatus::Cancelled => formatter.warn(&format!("{summary}, cancelled")),
        _ => formatter.error(&format!("{target}: sync failed")),
    }

    if let Some(completed) = job.completed_at() {
        let elapsed = completed - job.started_at();
        formatter.info(&format!("Duration: {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0));
    }
    if !job.errors().is_empty() {
        formatter.error(&format!(
            "{} error{}:",
            job.errors().len(),
            plural(job.errors().len() as u64)
        ));
        for err in job.errors() {
            formatter.info(&format!("- {}: {}", err.file_path, err.message));
        }
    }
}
