//! Reports: point-in-time snapshots per accounting year.

use crate::engine::{KindOutcome, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::kind::ResourceKind;
use crate::transport::{Query, Transport};
use tracing::{debug, warn};

/// Reports fetched for every accounting year.
const REPORTS: [&str; 3] = ["balance", "result", "saldo"];

impl<T: Transport> SyncEngine<T> {
    pub(crate) fn sync_reports(&mut self) -> SyncResult<KindOutcome> {
        let mut years = Vec::new();
        for year in self.accounting_years()? {
            match year.label() {
                Some(label) if is_path_component(&label) => years.push(label),
                Some(label) => warn!("Skipping accounting year with unusable name {:?}", label),
                None => debug!("Skipping accounting year with no name or end date: {:?}", year),
            }
        }
        let mut outcome = KindOutcome::default();

        for report in REPORTS {
            for year in &years {
                let name = format!("{}_{}.json", year, report);
                let path = self.archive.file_path(ResourceKind::Reports, &name);
                let query = Query::new(format!(
                    "/v1/{{organizationId}}/{}/reports/{}",
                    year, report
                ));
                let transport = &self.transport;

                let result = self.archive.download(&path, || {
                    let body = transport.fetch(&query)?;
                    serde_json::to_vec_pretty(&body).map_err(SyncError::from)
                });
                match result {
                    Ok(()) => {
                        outcome.fetched += 1;
                        outcome.attachments += 1;
                        debug!("Saved {}", name);
                    }
                    Err(e @ SyncError::Persistence { .. }) => return Err(e),
                    Err(e) => {
                        outcome.attachment_failures += 1;
                        warn!(year = %year, "Error fetching {} for {}: {}", report, year, e);
                    }
                }
            }
        }

        Ok(outcome)
    }
}

/// Year names end up in a file name and a URL segment.
fn is_path_component(label: &str) -> bool {
    !label.is_empty()
        && label != "."
        && label != ".."
        && !label.contains(['/', '\\', '?', '#'])
}
