//! Ledger entries, scoped by accounting year.
//!
//! Each year is fetched in full exactly once. After that, one combined
//! change set is fetched for all initialized years in windows of at most
//! [`SyncConfig::max_window_span`](crate::SyncConfig), routed to the owning
//! year by the entry's `Date` and merged into that year's collection.
//!
//! Every window is fetched before anything is written: a failing window
//! aborts the kind and leaves both the collections and the checkpoint as
//! they were.

use crate::checkpoint::format_timestamp;
use crate::csv_export::entries_to_csv;
use crate::engine::{identity_of, KindOutcome, SyncEngine};
use crate::error::SyncResult;
use crate::kind::ResourceKind;
use crate::period::{BackfillReason, Period, PeriodRouter};
use crate::reconcile::{reconcile, Accumulator};
use crate::record::{records_from_body, Record};
use crate::transport::{Query, Transport};
use crate::window::plan;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

const ENTRIES_PATH: &str = "/v1/{organizationId}/entries";
const CHANGES_PATH: &str = "/v1/{organizationId}/entries/changes";

/// Field routing a changed entry to its accounting year.
const DATE_FIELD: &str = "Date";

impl<T: Transport> SyncEngine<T> {
    pub(crate) fn sync_entries(&mut self, now: DateTime<Utc>) -> SyncResult<KindOutcome> {
        let kind = ResourceKind::Entries;
        let router = PeriodRouter::new(kind, self.accounting_periods()?);
        let period_plan = router.plan(&self.checkpoints, &self.archive);
        let mut outcome = KindOutcome::default();
        let mut persisted = false;

        if !period_plan.incremental.is_empty() {
            let since = self.checkpoints.get(kind);
            let changes = self.fetch_entry_changes(since, now)?;
            outcome.fetched = changes.len();

            let mut routed = router.route(changes, DATE_FIELD);
            for record in &routed.unroutable {
                warn!(
                    entry = record.id(),
                    date = record.get_str(DATE_FIELD).unwrap_or(""),
                    "Changed entry has no initialized accounting year, dropping"
                );
            }
            outcome.unroutable = routed.unroutable.len();

            for (period, baseline) in period_plan.incremental {
                let Some(bucket) = routed.buckets.remove(&period.id) else {
                    continue;
                };
                let merged = reconcile(baseline, bucket);
                info!(
                    period = period.id,
                    "Updated {} entries, added {} new entries",
                    merged.updated,
                    merged.added
                );
                outcome.updated += merged.updated;
                outcome.added += merged.added;
                self.write_period(&period, &merged.records)?;
                persisted = true;
            }

            // Years being backfilled this run get their changes from the full fetch.
            for (period, bucket) in routed.buckets {
                debug!(period, count = bucket.len(), "Changes covered by backfill");
            }
        }

        for (period, reason) in period_plan.backfill {
            match self.backfill_period(&period, reason) {
                Ok(count) => {
                    outcome.fetched += count;
                    outcome.added += count;
                    persisted = true;
                }
                Err(e) => {
                    error!(
                        period = period.id,
                        from = %period.start,
                        to = %period.end,
                        "Full fetch of entries failed, will retry next run: {}",
                        e
                    );
                    outcome.failed_periods.push(period.id);
                }
            }
        }

        if persisted {
            self.commit(kind, now, &mut outcome)?;
        } else {
            info!("No entries changes found (not updating lastSync)");
        }
        Ok(outcome)
    }

    /// Fetches the combined change set for `[since, now)` window by window.
    fn fetch_entry_changes(
        &self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SyncResult<Vec<Record>> {
        let identity = identity_of(ResourceKind::Entries)?;
        let mut changes = Accumulator::new();

        for window in plan(since, now, self.config.max_window_span) {
            info!("Fetching entries changes from {}", window);
            let query = Query::new(CHANGES_PATH)
                .param("changesFrom", format_timestamp(window.from))
                .param("changesTo", format_timestamp(window.to))
                .param("includePrimo", "true");

            let records = self
                .transport
                .fetch(&query)
                .and_then(|body| records_from_body(body, identity))
                .map_err(|e| {
                    error!(window = %window, "Fetching entries changes failed: {}", e);
                    e
                })?;
            debug!(window = %window, count = records.len(), "Fetched entries changes");
            changes.extend(records);
        }

        Ok(changes.into_records())
    }

    /// Fetches one year in full, persists it and marks it initialized.
    fn backfill_period(&mut self, period: &Period, reason: BackfillReason) -> SyncResult<usize> {
        info!(
            period = period.id,
            ?reason,
            "Fetching all entries from {} to {}",
            period.start,
            period.end
        );
        let query = Query::new(ENTRIES_PATH)
            .param("fromDate", period.start.to_string())
            .param("toDate", period.end.to_string())
            .param("includePrimo", "true");
        let body = self.transport.fetch(&query)?;
        let records = records_from_body(body, identity_of(ResourceKind::Entries)?)?;
        let records = Accumulator::from_records(records).into_records();

        self.write_period(period, &records)?;
        self.archive
            .initialize_period(&mut self.checkpoints, period.id)?;
        Ok(records.len())
    }

    fn write_period(&mut self, period: &Period, records: &[Record]) -> SyncResult<()> {
        let path = self.archive.period_path(ResourceKind::Entries, period.id);
        self.archive.write_collection(&path, records)?;

        if self.config.csv_export {
            match entries_to_csv(records) {
                Ok(csv) => self.archive.write_file(&path.with_extension("csv"), &csv)?,
                // The JSON collection is the archive; the CSV is regenerated on the next write.
                Err(e) => warn!(period = period.id, "Skipping CSV export: {}", e),
            }
        }
        Ok(())
    }
}
