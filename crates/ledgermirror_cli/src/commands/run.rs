//! Run command implementation.

use ledgermirror_client::{connect, ClientConfig};
use ledgermirror_engine::{
    CheckpointStore, KindReport, ResourceKind, RunReport, SyncConfig, SyncEngine, Transport,
};
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use tracing::{info, warn};

/// Options of the run command.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Preview only.
    pub dry_run: bool,
    /// Also render entries as CSV.
    pub csv: bool,
    /// Kinds to back up; empty means all.
    pub kinds: Vec<ResourceKind>,
}

/// Runs the backup against the configured API.
pub fn run(out_dir: &Path, options: &RunOptions) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let transport = connect(ClientConfig::from_env()?)?;
    let report = execute(out_dir, options, transport)?;

    if report.is_success() {
        info!("Backup completed successfully.");
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("Backup completed with errors.");
        Ok(ExitCode::from(1))
    }
}

/// Runs the backup through `transport`.
pub fn execute<T: Transport>(
    out_dir: &Path,
    options: &RunOptions,
    transport: T,
) -> Result<RunReport, Box<dyn std::error::Error>> {
    if !options.dry_run {
        fs::create_dir_all(out_dir)
            .map_err(|e| format!("Failed to create output directory {}: {e}", out_dir.display()))?;
    }

    let config = SyncConfig::new(out_dir)
        .with_dry_run(options.dry_run)
        .with_csv_export(options.csv);
    let checkpoints = CheckpointStore::load_or_default(config.checkpoint_path());

    info!("Starting backup to {}...", out_dir.display());
    if options.dry_run {
        info!("DRY RUN MODE: No files will be written, state will not be updated.");
    }

    let mut engine = SyncEngine::new(config, transport, checkpoints)?;
    let report = engine.run(&options.kinds);

    for kind in &report.kinds {
        println!("{}", summary_line(kind));
    }
    Ok(report)
}

fn summary_line(report: &KindReport) -> String {
    let status = match &report.result {
        Err(e) => format!("failed: {e}"),
        Ok(outcome) if !outcome.failed_periods.is_empty() => {
            format!("failed periods {:?}", outcome.failed_periods)
        }
        Ok(outcome) if outcome.is_unchanged() => "no changes".to_string(),
        Ok(outcome) => {
            let mut parts = vec![
                format!("{} fetched", outcome.fetched),
                format!("{} updated", outcome.updated),
                format!("{} added", outcome.added),
            ];
            if outcome.deleted > 0 {
                parts.push(format!("{} deleted", outcome.deleted));
            }
            if outcome.attachments > 0 || outcome.attachment_failures > 0 {
                parts.push(format!(
                    "{} files ({} failed)",
                    outcome.attachments, outcome.attachment_failures
                ));
            }
            if outcome.unroutable > 0 {
                parts.push(format!("{} unroutable", outcome.unroutable));
            }
            parts.join(", ")
        }
    };
    let mark = if report.is_success() { "✓" } else { "✗" };
    format!("{mark} {:<13} {status}", report.kind.label())
}
