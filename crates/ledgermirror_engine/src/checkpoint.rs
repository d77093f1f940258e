//! Persisted per-kind checkpoints.
//!
//! The checkpoint file is a single JSON document:
//!
//! ```text
//! {
//!   "lastSync": { "invoices": "2024-03-01T10:00:00Z", ... },
//!   "entriesInitializedYears": [2023, 2024]
//! }
//! ```
//!
//! All mutators work on the in-memory copy. [`CheckpointStore::persist`] is
//! the only durability boundary and rewrites the whole file atomically.

use crate::archive::write_atomic;
use crate::error::{SyncError, SyncResult};
use crate::kind::ResourceKind;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the checkpoint file inside the output directory.
pub const CHECKPOINT_FILE: &str = "state.json";

/// Timestamp used for kinds that were never synchronized.
pub fn default_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Formats a timestamp the way it is stored on disk.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// On-disk shape of the checkpoint file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckpointFile {
    #[serde(default)]
    last_sync: BTreeMap<String, String>,
    #[serde(default)]
    entries_initialized_years: BTreeSet<i32>,
    /// Unknown top-level fields, kept so a load/save cycle is lossless.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Default for CheckpointFile {
    fn default() -> Self {
        let epoch = format_timestamp(default_epoch());
        Self {
            last_sync: ResourceKind::ALL
                .iter()
                .map(|kind| (kind.checkpoint_key().to_string(), epoch.clone()))
                .collect(),
            entries_initialized_years: BTreeSet::new(),
            extra: Map::new(),
        }
    }
}

/// Per-kind last-synchronized timestamps plus initialized periods.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    file: CheckpointFile,
}

impl CheckpointStore {
    /// Creates a store with default state, backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: CheckpointFile::default(),
        }
    }

    /// Loads the store from `path`.
    ///
    /// A missing file yields the defaults. An unreadable or invalid file is
    /// reported as [`SyncError::StateCorruption`].
    pub fn load(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No checkpoint file, using defaults");
                return Ok(Self::new(path));
            }
            Err(e) => return Err(SyncError::corruption(&path, e.to_string())),
        };

        let mut file: CheckpointFile = serde_json::from_slice(&data)
            .map_err(|e| SyncError::corruption(&path, e.to_string()))?;

        let defaults = CheckpointFile::default();
        for (key, value) in defaults.last_sync {
            file.last_sync.entry(key).or_insert(value);
        }

        Ok(Self { path, file })
    }

    /// Loads the store, falling back to defaults if the file is corrupt.
    pub fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(&path) {
            Ok(store) => store,
            Err(e) => {
                warn!("Could not load checkpoint state, starting fresh: {}", e);
                Self::new(path)
            }
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the last-synchronized timestamp of `kind`.
    ///
    /// An unparseable stored value reads as the default epoch.
    pub fn get(&self, kind: ResourceKind) -> DateTime<Utc> {
        let raw = self.raw(kind);
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                if !raw.is_empty() {
                    warn!(kind = %kind, value = raw, "Invalid checkpoint timestamp ({}), using default", e);
                }
                default_epoch()
            }
        }
    }

    /// Returns the stored string for `kind`.
    pub fn raw(&self, kind: ResourceKind) -> &str {
        self.file
            .last_sync
            .get(kind.checkpoint_key())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Returns true if `kind` has never advanced past the default epoch.
    pub fn is_default(&self, kind: ResourceKind) -> bool {
        self.get(kind) <= default_epoch()
    }

    /// Advances the checkpoint of `kind` to `ts`.
    ///
    /// Checkpoints never move backwards; an older `ts` is ignored and
    /// `false` is returned.
    pub fn set(&mut self, kind: ResourceKind, ts: DateTime<Utc>) -> bool {
        let current = self.get(kind);
        if ts < current {
            warn!(
                kind = %kind,
                current = %format_timestamp(current),
                requested = %format_timestamp(ts),
                "Refusing to move checkpoint backwards"
            );
            return false;
        }
        self.file
            .last_sync
            .insert(kind.checkpoint_key().to_string(), format_timestamp(ts));
        true
    }

    /// Returns true if the period completed its one-time full backfill.
    pub fn is_period_initialized(&self, period: i32) -> bool {
        self.file.entries_initialized_years.contains(&period)
    }

    /// Marks a period as backfilled.
    pub fn mark_period_initialized(&mut self, period: i32) {
        self.file.entries_initialized_years.insert(period);
    }

    /// Returns the initialized periods in ascending order.
    pub fn initialized_periods(&self) -> Vec<i32> {
        self.file.entries_initialized_years.iter().copied().collect()
    }

    /// Writes the entire state to disk atomically.
    pub fn persist(&self) -> SyncResult<()> {
        let data = serde_json::to_vec_pretty(&self.file)
            .map_err(|e| SyncError::Decode(format!("failed to encode checkpoint: {e}")))?;
        write_atomic(&self.path, &data)
    }
}
