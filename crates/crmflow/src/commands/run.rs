use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Table};
use crmflow_core::config::EtlConfig;
use crmflow_core::pipeline::EtlPipeline;
use crmflow_core::result::RunReport;

use super::{connect_analytics, connect_source};

pub async fn handle_run(
    full: bool,
    dry_run: bool,
    config_path: Option<PathBuf>,
    production: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => EtlConfig::from_toml_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None if production => EtlConfig::production(),
        None => EtlConfig::default(),
    };
    if full {
        config.incremental = false;
    }
    config.validate()?;

    let source = connect_source().await?;
    let analytics = connect_analytics().await?;

    let pipeline = EtlPipeline::new(config, source, analytics);
    let report = pipeline.run(dry_run).await?;

    print_report(&report);
    check_failures(&report)
}

/// Any failed entity fails the invocation, so schedulers get a non-zero
/// exit even when the run as a whole only completed with errors.
fn check_failures(report: &RunReport) -> Result<()> {
    let failed = report.failed_entities();
    if failed.is_empty() {
        return Ok(());
    }
    anyhow::bail!(
        "run {} {}; failed entities: {}",
        report.run_id,
        report.status,
        failed.join(", ")
    )
}

fn print_report(report: &RunReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "entity", "status", "processed", "inserted", "updated", "deleted", "seconds", "error",
    ]);

    for (entity, result) in &report.results {
        table.add_row(vec![
            Cell::new(entity),
            Cell::new(result.status_label()),
            Cell::new(result.records_processed),
            Cell::new(result.records_inserted),
            Cell::new(result.records_updated),
            Cell::new(result.records_deleted),
            Cell::new(format!("{:.2}", result.processing_time_seconds)),
            Cell::new(result.error_message.as_deref().unwrap_or("-")),
        ]);
    }

    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!("\nRun {}: {}{mode}", report.run_id, report.status);
    println!("{table}");

    let combined = &report.combined;
    println!(
        "Totals: {} processed, {} inserted, {} updated, {} deleted in {:.2}s",
        combined.records_processed,
        combined.records_inserted,
        combined.records_updated,
        combined.records_deleted,
        combined.processing_time_seconds,
    );
}
