//! Configuration for the sync engine.

use crate::archive::RunMode;
use crate::checkpoint::{default_epoch, CHECKPOINT_FILE};
use crate::error::{SyncError, SyncResult};
use crate::window::max_window_span;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Output directory of the archive.
    pub out_dir: PathBuf,
    /// Live or preview (dry run).
    pub mode: RunMode,
    /// Maximum span of one change query window.
    pub max_window_span: Duration,
    /// Timestamp used when a checkpoint was never set or is unreadable.
    pub epoch: DateTime<Utc>,
    /// Page size for paged list endpoints.
    pub page_size: u32,
    /// Whether entries are also rendered as CSV.
    pub csv_export: bool,
}

impl SyncConfig {
    /// Creates a new configuration writing to `out_dir`.
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            mode: RunMode::Live,
            max_window_span: max_window_span(),
            epoch: default_epoch(),
            page_size: 100,
            csv_export: false,
        }
    }

    /// Enables or disables preview mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.mode = if dry_run {
            RunMode::Preview
        } else {
            RunMode::Live
        };
        self
    }

    /// Sets the maximum window span.
    pub fn with_max_window_span(mut self, span: Duration) -> Self {
        self.max_window_span = span;
        self
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Enables or disables CSV export of entries.
    pub fn with_csv_export(mut self, enabled: bool) -> Self {
        self.csv_export = enabled;
        self
    }

    /// Path of the checkpoint file.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.out_dir.join(CHECKPOINT_FILE)
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> SyncResult<()> {
        if self.max_window_span <= Duration::zero() {
            return Err(SyncError::Config("window span must be positive".into()));
        }
        if self.page_size == 0 {
            return Err(SyncError::Config("page size must be positive".into()));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("output")
    }
}
