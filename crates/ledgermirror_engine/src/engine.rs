//! The sync orchestrator.
//!
//! [`SyncEngine`] drives one resource kind at a time in the fixed order of
//! [`ResourceKind::ALL`]. A failure in one kind is logged and recorded in
//! the [`RunReport`]; the run continues with the next kind.

use crate::archive::{Archive, Effect};
use crate::checkpoint::{format_timestamp, CheckpointStore};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::kind::ResourceKind;
use crate::period::{accounting_years_from_body, periods_from_years, AccountingYear, Period};
use crate::record::{collection_items, records_from_items, Record};
use crate::reconcile::Accumulator;
use crate::transport::{Query, Transport};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Counters describing what one kind did during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindOutcome {
    /// Records received from the remote source.
    pub fetched: usize,
    /// Existing records replaced by a newer version.
    pub updated: usize,
    /// Records appended as new.
    pub added: usize,
    /// Records received from the deletes-only fetch.
    pub deleted: usize,
    /// Attachments written (or that would be written).
    pub attachments: usize,
    /// Attachments that could not be fetched or written.
    pub attachment_failures: usize,
    /// Changed records that could not be routed to a period.
    pub unroutable: usize,
    /// Periods whose full backfill failed.
    pub failed_periods: Vec<i32>,
    /// New checkpoint, if the kind advanced it.
    pub checkpoint: Option<DateTime<Utc>>,
}

impl KindOutcome {
    /// Returns true if the kind found nothing to do.
    pub fn is_unchanged(&self) -> bool {
        self.checkpoint.is_none() && self.fetched == 0 && self.attachments == 0
    }
}

/// Result of one kind within a run.
#[derive(Debug)]
pub struct KindReport {
    /// The kind.
    pub kind: ResourceKind,
    /// Outcome, or the error that aborted the kind.
    pub result: SyncResult<KindOutcome>,
    /// Effects performed (or previewed) by the kind.
    pub effects: Vec<Effect>,
}

impl KindReport {
    /// Returns true if the kind completed without failures.
    pub fn is_success(&self) -> bool {
        matches!(&self.result, Ok(outcome) if outcome.failed_periods.is_empty())
    }
}

/// Result of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// One report per attempted kind, in processing order.
    pub kinds: Vec<KindReport>,
}

impl RunReport {
    /// Returns true if every attempted kind succeeded.
    pub fn is_success(&self) -> bool {
        self.kinds.iter().all(KindReport::is_success)
    }

    /// Returns the kinds that failed.
    pub fn failed_kinds(&self) -> Vec<ResourceKind> {
        self.kinds
            .iter()
            .filter(|report| !report.is_success())
            .map(|report| report.kind)
            .collect()
    }

    /// Returns the report of `kind`, if it was attempted.
    pub fn get(&self, kind: ResourceKind) -> Option<&KindReport> {
        self.kinds.iter().find(|report| report.kind == kind)
    }
}

/// The sync engine mirrors remote resources into the local archive.
pub struct SyncEngine<T: Transport> {
    pub(crate) config: SyncConfig,
    pub(crate) transport: T,
    pub(crate) checkpoints: CheckpointStore,
    pub(crate) archive: Archive,
    years: Option<Vec<AccountingYear>>,
}

impl<T: Transport> SyncEngine<T> {
    /// Creates a new engine.
    pub fn new(config: SyncConfig, transport: T, checkpoints: CheckpointStore) -> SyncResult<Self> {
        config.validate()?;
        let archive = Archive::new(&config.out_dir, config.mode);
        Ok(Self {
            config,
            transport,
            checkpoints,
            archive,
            years: None,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the in-memory checkpoint state.
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Consumes the engine and returns the checkpoint state.
    pub fn into_checkpoints(self) -> CheckpointStore {
        self.checkpoints
    }

    /// Runs the selected kinds. An empty selection runs every kind.
    pub fn run(&mut self, kinds: &[ResourceKind]) -> RunReport {
        self.run_at(kinds, Utc::now())
    }

    /// Runs the selected kinds with `now` as the upper bound of every
    /// change query and as the new checkpoint value.
    pub fn run_at(&mut self, kinds: &[ResourceKind], now: DateTime<Utc>) -> RunReport {
        let mut report = RunReport::default();
        self.years = None;

        for kind in ResourceKind::ALL {
            if !kinds.is_empty() && !kinds.contains(&kind) {
                continue;
            }

            info!("Backing up {}...", kind.label());
            let result = self.sync_kind(kind, now);
            let effects = self.archive.take_effects();

            match &result {
                Ok(outcome) if !outcome.failed_periods.is_empty() => {
                    error!(
                        kind = %kind,
                        "{} backed up with failed periods {:?}",
                        kind.label(),
                        outcome.failed_periods
                    );
                }
                Ok(outcome) if outcome.is_unchanged() => {
                    info!(kind = %kind, "No {} changes", kind.label().to_lowercase());
                }
                Ok(outcome) => {
                    info!(
                        kind = %kind,
                        fetched = outcome.fetched,
                        updated = outcome.updated,
                        added = outcome.added,
                        "{} backed up",
                        kind.label()
                    );
                }
                Err(e) => {
                    error!(
                        kind = %kind,
                        since = %format_timestamp(self.checkpoints.get(kind)),
                        "Error backing up {}: {}",
                        kind.label().to_lowercase(),
                        e
                    );
                }
            }

            report.kinds.push(KindReport {
                kind,
                result,
                effects,
            });
        }

        report
    }

    fn sync_kind(&mut self, kind: ResourceKind, now: DateTime<Utc>) -> SyncResult<KindOutcome> {
        match kind {
            ResourceKind::Reports => self.sync_reports(),
            ResourceKind::Invoices | ResourceKind::CreditNotes => self.sync_sales(kind, now),
            ResourceKind::Entries => self.sync_entries(now),
            ResourceKind::Vouchers => self.sync_vouchers(now),
            ResourceKind::Contacts => self.sync_contacts(now),
        }
    }

    /// Returns the accounting years, fetched at most once per run.
    pub(crate) fn accounting_years(&mut self) -> SyncResult<Vec<AccountingYear>> {
        if let Some(years) = &self.years {
            return Ok(years.clone());
        }
        let body = self
            .transport
            .fetch(&Query::new("/v1/{organizationId}/accountingyears"))?;
        let years = accounting_years_from_body(body)?;
        debug!("Found {} accounting years", years.len());
        self.years = Some(years.clone());
        Ok(years)
    }

    /// Returns the accounting years as periods.
    pub(crate) fn accounting_periods(&mut self) -> SyncResult<Vec<Period>> {
        Ok(periods_from_years(&self.accounting_years()?))
    }

    /// Fetches every page of a paged list, accumulating last-write-wins.
    ///
    /// Paging continues only while the response carries a `Pagination`
    /// object, the page is full and it added at least one new identity. An
    /// endpoint that ignores `page` therefore costs one extra request.
    pub(crate) fn fetch_paged(&self, query: Query, identity: &str) -> SyncResult<Vec<Record>> {
        let page_size = self.config.page_size;
        let mut accumulated = Accumulator::new();
        let mut page = 0u32;

        loop {
            let mut request = query.clone();
            request.set("page", page.to_string());
            request.set("pageSize", page_size.to_string());

            let body = self.transport.fetch(&request)?;
            let paginated = body.get("Pagination").is_some_and(|p| !p.is_null());
            let items = collection_items(body)?;
            let received = items.len();
            let before = accumulated.len();
            accumulated.extend(records_from_items(items, identity));
            let added = accumulated.len() - before;
            debug!(path = %query.path, page, received, added, "Fetched page");

            if !paginated || received < page_size as usize {
                break;
            }
            if added == 0 {
                warn!(
                    path = %query.path,
                    page,
                    "Page added no new records, assuming the endpoint ignores paging"
                );
                break;
            }
            page += 1;
        }

        Ok(accumulated.into_records())
    }

    /// Loads the persisted baseline of a merged kind and picks the lower
    /// bound of its change query.
    ///
    /// A missing or corrupt baseline after a previous sync means the delta
    /// would be merged onto nothing, so the kind is re-fetched from the
    /// epoch instead.
    pub(crate) fn load_baseline(
        &self,
        kind: ResourceKind,
        path: &Path,
    ) -> SyncResult<(Vec<Record>, DateTime<Utc>)> {
        let identity = identity_of(kind)?;
        let since = self.checkpoints.get(kind);
        match self.archive.load_collection(path, identity) {
            Ok(Some(records)) => Ok((records, since)),
            Ok(None) if self.checkpoints.is_default(kind) => Ok((Vec::new(), since)),
            Ok(None) => {
                warn!(
                    kind = %kind,
                    "Baseline {} missing, re-fetching from {}",
                    path.display(),
                    format_timestamp(self.config.epoch)
                );
                Ok((Vec::new(), self.config.epoch))
            }
            Err(e) => {
                warn!(
                    kind = %kind,
                    "{}, re-fetching from {}",
                    e,
                    format_timestamp(self.config.epoch)
                );
                Ok((Vec::new(), self.config.epoch))
            }
        }
    }

    /// Advances the checkpoint of `kind` and records it in `outcome`.
    pub(crate) fn commit(
        &mut self,
        kind: ResourceKind,
        now: DateTime<Utc>,
        outcome: &mut KindOutcome,
    ) -> SyncResult<()> {
        if self
            .archive
            .advance_checkpoint(&mut self.checkpoints, kind, now)?
        {
            outcome.checkpoint = Some(now);
        }
        Ok(())
    }
}

/// Identity field of a merged kind.
pub(crate) fn identity_of(kind: ResourceKind) -> SyncResult<&'static str> {
    kind.identity_field()
        .ok_or_else(|| SyncError::Config(format!("{kind} has no identity field")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use serde_json::json;
    use tempfile::TempDir;

    fn engine(dir: &TempDir, transport: MockTransport) -> SyncEngine<MockTransport> {
        let config = SyncConfig::new(dir.path()).with_page_size(2);
        let store = CheckpointStore::new(config.checkpoint_path());
        SyncEngine::new(config, transport, store).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = SyncConfig::default().with_page_size(0);
        let store = CheckpointStore::new(config.checkpoint_path());
        assert!(SyncEngine::new(config, MockTransport::new(), store).is_err());
    }

    #[test]
    fn paged_fetch_stops_at_short_page() {
        let dir = TempDir::new().unwrap();
        let transport = MockTransport::new();
        let path = "/v2/{organizationId}/contacts";
        transport.respond_when(
            path,
            &[("page", "0")],
            Ok(json!({
                "Collection": [{"ContactGuid": "a", "v": 1}, {"ContactGuid": "b"}],
                "Pagination": {"Page": 0, "PageSize": 2}
            })),
        );
        transport.respond_when(
            path,
            &[("page", "1")],
            Ok(json!([{"ContactGuid": "a", "v": 2}])),
        );
        let engine = engine(&dir, transport);

        let records = engine
            .fetch_paged(Query::new(path).param("changesSince", "x"), "ContactGuid")
            .unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(records[0].value()["v"], 2);

        let requests = engine.transport().requests_to(path);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].get("pageSize"), Some("2"));
        assert_eq!(requests[1].get("changesSince"), Some("x"));
    }

    #[test]
    fn unpaginated_full_page_is_fetched_once() {
        let dir = TempDir::new().unwrap();
        let transport = MockTransport::new();
        let path = "/v1/{organizationId}/sales/creditnotes";
        transport.respond(path, json!([{"Guid": "a"}, {"Guid": "b"}]));
        let engine = engine(&dir, transport);

        let records = engine.fetch_paged(Query::new(path), "Guid").unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(engine.transport().requests_to(path).len(), 1);
    }

    #[test]
    fn repeated_page_stops_paging() {
        let dir = TempDir::new().unwrap();
        let transport = MockTransport::new();
        let path = "/v2/{organizationId}/contacts";
        transport.respond(
            path,
            json!({
                "Collection": [{"ContactGuid": "a"}, {"ContactGuid": "b"}],
                "Pagination": {"Page": 0, "PageSize": 2}
            }),
        );
        let engine = engine(&dir, transport);

        let records = engine.fetch_paged(Query::new(path), "ContactGuid").unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(engine.transport().requests_to(path).len(), 2);
    }

    #[test]
    fn accounting_years_fetched_once() {
        let dir = TempDir::new().unwrap();
        let transport = MockTransport::new();
        transport.respond(
            "/v1/{organizationId}/accountingyears",
            json!([{"Name": "2024", "FromDate": "2024-01-01", "ToDate": "2024-12-31"}]),
        );
        let mut engine = engine(&dir, transport);

        assert_eq!(engine.accounting_periods().unwrap().len(), 1);
        assert_eq!(engine.accounting_periods().unwrap()[0].id, 2024);
        assert_eq!(
            engine
                .transport()
                .requests_to("/v1/{organizationId}/accountingyears")
                .len(),
            1
        );
    }

    #[test]
    fn corrupt_baseline_refetches_from_epoch() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir, MockTransport::new());
        let later = Utc::now();
        engine.checkpoints.set(ResourceKind::Contacts, later);
        let path = engine.archive.collection_path(ResourceKind::Contacts);

        let (records, since) = engine.load_baseline(ResourceKind::Contacts, &path).unwrap();
        assert!(records.is_empty());
        assert_eq!(since, engine.config.epoch);

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        let (_, since) = engine.load_baseline(ResourceKind::Contacts, &path).unwrap();
        assert_eq!(since, engine.config.epoch);

        std::fs::write(&path, r#"[{"ContactGuid": "a"}]"#).unwrap();
        let (records, since) = engine.load_baseline(ResourceKind::Contacts, &path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(since, engine.checkpoints.get(ResourceKind::Contacts));
    }

    #[test]
    fn report_success_requires_every_kind() {
        let ok = KindReport {
            kind: ResourceKind::Contacts,
            result: Ok(KindOutcome::default()),
            effects: Vec::new(),
        };
        let degraded = KindReport {
            kind: ResourceKind::Entries,
            result: Ok(KindOutcome {
                failed_periods: vec![2023],
                ..KindOutcome::default()
            }),
            effects: Vec::new(),
        };
        let failed = KindReport {
            kind: ResourceKind::Invoices,
            result: Err(SyncError::status(500, "boom")),
            effects: Vec::new(),
        };

        assert!(ok.is_success());
        assert!(!degraded.is_success());
        let report = RunReport {
            kinds: vec![failed, ok, degraded],
        };
        assert!(!report.is_success());
        assert_eq!(
            report.failed_kinds(),
            vec![ResourceKind::Invoices, ResourceKind::Entries]
        );
        assert!(report.get(ResourceKind::Contacts).unwrap().is_success());
    }
}
