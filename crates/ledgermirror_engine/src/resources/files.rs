//! Vouchers: uploaded files listed since the checkpoint.
//!
//! The listing is merged into `files/index.json`, then each file not yet
//! present locally is downloaded next to it.

use crate::checkpoint::format_timestamp;
use crate::engine::{identity_of, KindOutcome, SyncEngine};
use crate::error::SyncResult;
use crate::kind::ResourceKind;
use crate::reconcile::reconcile;
use crate::record::{records_from_body, Record};
use crate::transport::{Query, Transport};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info, warn};

const FILES_PATH: &str = "/v1/{organizationId}/files";

impl<T: Transport> SyncEngine<T> {
    pub(crate) fn sync_vouchers(&mut self, now: DateTime<Utc>) -> SyncResult<KindOutcome> {
        let kind = ResourceKind::Vouchers;
        let path = self.archive.collection_path(kind);
        let (baseline, since) = self.load_baseline(kind, &path)?;
        let mut outcome = KindOutcome::default();

        let mut query = Query::new(FILES_PATH).param("fileStatus", "Used");
        if since > self.config.epoch {
            info!("Fetching files uploaded after {}", format_timestamp(since));
            query.set("uploadedAfter", format_timestamp(since));
        }

        let body = self.transport.fetch(&query)?;
        let files = records_from_body(body, identity_of(kind)?)?;
        outcome.fetched = files.len();

        if files.is_empty() {
            info!("No files found (not updating lastSync)");
            return Ok(outcome);
        }
        info!("Found {} files", files.len());

        let merged = reconcile(baseline, files.clone());
        outcome.updated = merged.updated;
        outcome.added = merged.added;
        self.archive.write_collection(&path, &merged.records)?;

        for file in &files {
            self.download_voucher(file, &mut outcome);
        }

        self.commit(kind, now, &mut outcome)?;
        Ok(outcome)
    }

    fn download_voucher(&mut self, file: &Record, outcome: &mut KindOutcome) {
        let name = local_file_name(file);
        let path = self.archive.file_path(ResourceKind::Vouchers, &name);
        if self.archive.exists(&path) {
            debug!("Skipping existing file: {}", name);
            return;
        }

        let query = Query::new(format!("{FILES_PATH}/{}", file.id()));
        let transport = &self.transport;
        match self.archive.download(&path, || transport.fetch_blob(&query)) {
            Ok(()) => outcome.attachments += 1,
            Err(e) => {
                outcome.attachment_failures += 1;
                warn!(file = file.id(), "Failed to download file {}: {}", name, e);
            }
        }
    }
}

/// Local name of a voucher file, reduced to its final path component.
fn local_file_name(file: &Record) -> String {
    file.get_str("FileName")
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}.pdf", file.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn file(name: Option<&str>) -> Record {
        Record::from_value(json!({"FileGuid": "f1", "FileName": name}), "FileGuid").unwrap()
    }

    #[test]
    fn file_names_are_confined_to_the_files_directory() {
        assert_eq!(local_file_name(&file(Some("receipt.pdf"))), "receipt.pdf");
        assert_eq!(local_file_name(&file(Some("../../etc/passwd"))), "passwd");
        assert_eq!(local_file_name(&file(Some("scans/2024/a.jpg"))), "a.jpg");
        assert_eq!(local_file_name(&file(Some(".."))), "f1.pdf");
        assert_eq!(local_file_name(&file(Some(""))), "f1.pdf");
        assert_eq!(local_file_name(&file(None)), "f1.pdf");
    }
}
