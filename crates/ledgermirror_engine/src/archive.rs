//! Local file archive and the effect boundary of a run.
//!
//! Every mutating effect of a run (collection writes, attachment writes,
//! checkpoint advances, period initialization) goes through [`Archive`].
//! In [`RunMode::Preview`] the same calls are made, but each effect is only
//! logged and recorded instead of performed, so a dry run traverses the
//! exact code path of a live run.
//!
//! Layout below the output root:
//!
//! ```text
//! <root>/
//! ├─ state.json
//! ├─ invoices/invoices.json
//! ├─ deleted/invoices.json
//! ├─ entries/entries_<year>.json
//! ├─ files/index.json
//! └─ ...
//! ```

use crate::checkpoint::{format_timestamp, CheckpointStore};
use crate::error::{SyncError, SyncResult};
use crate::kind::ResourceKind;
use crate::record::{records_from_items, Record};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Whether effects are performed or only reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Effects are performed.
    #[default]
    Live,
    /// Effects are logged as "would have done" and skipped.
    Preview,
}

/// A mutating effect of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// A collection file was (or would be) rewritten.
    WriteCollection {
        /// Target file.
        path: PathBuf,
        /// Number of records in the collection.
        records: usize,
    },
    /// A raw file was (or would be) written.
    WriteFile {
        /// Target file.
        path: PathBuf,
        /// Size in bytes.
        bytes: usize,
    },
    /// A remote attachment was (or would be) downloaded to a file.
    Download {
        /// Target file.
        path: PathBuf,
    },
    /// A checkpoint was (or would be) advanced and flushed.
    AdvanceCheckpoint {
        /// Kind whose checkpoint moved.
        kind: ResourceKind,
        /// New timestamp.
        to: DateTime<Utc>,
    },
    /// A period was (or would be) marked as backfilled and flushed.
    InitializePeriod {
        /// Period identifier.
        period: i32,
    },
}

/// The local archive rooted at the output directory.
#[derive(Debug)]
pub struct Archive {
    root: PathBuf,
    mode: RunMode,
    effects: Vec<Effect>,
}

impl Archive {
    /// Creates an archive rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, mode: RunMode) -> Self {
        Self {
            root: root.into(),
            mode,
            effects: Vec::new(),
        }
    }

    /// Returns the output root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the run mode.
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Returns true in preview mode.
    pub fn is_preview(&self) -> bool {
        self.mode == RunMode::Preview
    }

    /// Path of the merged collection for `kind`.
    pub fn collection_path(&self, kind: ResourceKind) -> PathBuf {
        let file = match kind {
            ResourceKind::Vouchers => "index.json".to_string(),
            other => format!("{}.json", other.dir_name()),
        };
        self.root.join(kind.dir_name()).join(file)
    }

    /// Path of the deletes-only collection for `kind`.
    pub fn deleted_path(&self, kind: ResourceKind) -> PathBuf {
        self.root
            .join("deleted")
            .join(format!("{}.json", kind.dir_name()))
    }

    /// Path of the collection for one period of `kind`.
    pub fn period_path(&self, kind: ResourceKind, period: i32) -> PathBuf {
        self.root
            .join(kind.dir_name())
            .join(format!("{}_{}.json", kind.dir_name(), period))
    }

    /// Path of an attachment or other raw file of `kind`.
    pub fn file_path(&self, kind: ResourceKind, name: &str) -> PathBuf {
        self.root.join(kind.dir_name()).join(name)
    }

    /// Loads a persisted collection.
    ///
    /// Returns `Ok(None)` if the file does not exist and
    /// [`SyncError::StateCorruption`] if it cannot be read or parsed.
    pub fn load_collection(
        &self,
        path: &Path,
        identity_field: &str,
    ) -> SyncResult<Option<Vec<Record>>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::corruption(path, e.to_string())),
        };
        let items: Vec<Value> = serde_json::from_slice(&data)
            .map_err(|e| SyncError::corruption(path, e.to_string()))?;
        Ok(Some(records_from_items(items, identity_field)))
    }

    /// Returns true if `path` exists on disk.
    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Rewrites a collection file with `records`.
    pub fn write_collection(&mut self, path: &Path, records: &[Record]) -> SyncResult<()> {
        self.effects.push(Effect::WriteCollection {
            path: path.to_path_buf(),
            records: records.len(),
        });
        if self.is_preview() {
            info!("[dry run] Would save {} records to {}", records.len(), path.display());
            return Ok(());
        }
        let data = serde_json::to_vec_pretty(records)
            .map_err(|e| SyncError::Decode(format!("failed to encode collection: {e}")))?;
        write_atomic(path, &data)?;
        info!("Saved {} records to {}", records.len(), path.display());
        Ok(())
    }

    /// Writes a raw file.
    pub fn write_file(&mut self, path: &Path, bytes: &[u8]) -> SyncResult<()> {
        self.effects.push(Effect::WriteFile {
            path: path.to_path_buf(),
            bytes: bytes.len(),
        });
        if self.is_preview() {
            info!("[dry run] Would write {}", path.display());
            return Ok(());
        }
        write_atomic(path, bytes)?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Fetches content with `fetch` and writes it to `path`.
    ///
    /// In preview mode `fetch` is not called, so no attachment is downloaded.
    pub fn download<F>(&mut self, path: &Path, fetch: F) -> SyncResult<()>
    where
        F: FnOnce() -> SyncResult<Vec<u8>>,
    {
        self.effects.push(Effect::Download {
            path: path.to_path_buf(),
        });
        if self.is_preview() {
            info!("[dry run] Would download {}", path.display());
            return Ok(());
        }
        let bytes = fetch()?;
        write_atomic(path, &bytes)?;
        debug!("Downloaded {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Advances the checkpoint of `kind` and flushes the checkpoint file.
    ///
    /// Returns `false` when `to` is older than the stored checkpoint; nothing
    /// is recorded or written then. `store` is only updated once the new
    /// state is on disk.
    pub fn advance_checkpoint(
        &mut self,
        store: &mut CheckpointStore,
        kind: ResourceKind,
        to: DateTime<Utc>,
    ) -> SyncResult<bool> {
        if self.is_preview() {
            if to < store.get(kind) {
                return Ok(false);
            }
            self.effects.push(Effect::AdvanceCheckpoint { kind, to });
            info!(
                "[dry run] Would update state.{} to {}",
                kind.checkpoint_key(),
                format_timestamp(to)
            );
            return Ok(true);
        }

        let mut next = store.clone();
        if !next.set(kind, to) {
            return Ok(false);
        }
        self.effects.push(Effect::AdvanceCheckpoint { kind, to });
        next.persist()?;
        *store = next;
        debug!(kind = %kind, "Checkpoint advanced to {}", format_timestamp(to));
        Ok(true)
    }

    /// Marks `period` as backfilled and flushes the checkpoint file.
    pub fn initialize_period(&mut self, store: &mut CheckpointStore, period: i32) -> SyncResult<()> {
        self.effects.push(Effect::InitializePeriod { period });
        if self.is_preview() {
            info!("[dry run] Would mark year {} as initialized", period);
            return Ok(());
        }
        let mut next = store.clone();
        next.mark_period_initialized(period);
        next.persist()?;
        *store = next;
        Ok(())
    }

    /// Returns the effects recorded so far.
    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Drains the recorded effects.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }
}

/// Writes `data` to `path` atomically.
///
/// Uses write-then-rename for crash safety:
/// 1. Write to a temporary file next to the target
/// 2. Sync the temporary file
/// 3. Rename it over the target
/// 4. Sync the parent directory
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> SyncResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| SyncError::persistence(&parent, e))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| SyncError::Config(format!("not a file path: {}", path.display())))?;
    let temp_path = parent.join(format!(".{file_name}.tmp"));

    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(SyncError::persistence(path, e));
    }

    sync_directory(&parent).map_err(|e| SyncError::persistence(&parent, e))
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> std::io::Result<()> {
    // NTFS journaling covers rename durability
    Ok(())
}
