//! Invoices and credit notes.
//!
//! Both kinds fetch changes since the checkpoint, merge them into one
//! collection and keep a separate collection of deleted records. The
//! deletes-only fetch is best effort. Booked invoices additionally get
//! their PDF downloaded once the collection is persisted.

use crate::checkpoint::format_timestamp;
use crate::engine::{identity_of, KindOutcome, SyncEngine};
use crate::error::SyncResult;
use crate::kind::ResourceKind;
use crate::reconcile::reconcile;
use crate::record::Record;
use crate::transport::{Query, Transport};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

const INVOICE_FIELDS: &str = "Guid,ContactName,Date,Description,TotalInclVat,Status,CreatedAt,\
UpdatedAt,DeletedAt,Number,ExternalReference,ContactGuid,PaymentDate,TotalExclVat,Currency";

fn endpoint(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::CreditNotes => "/v1/{organizationId}/sales/creditnotes",
        _ => "/v1/{organizationId}/invoices",
    }
}

impl<T: Transport> SyncEngine<T> {
    pub(crate) fn sync_sales(
        &mut self,
        kind: ResourceKind,
        now: DateTime<Utc>,
    ) -> SyncResult<KindOutcome> {
        let identity = identity_of(kind)?;
        let path = self.archive.collection_path(kind);
        let (baseline, since) = self.load_baseline(kind, &path)?;
        let mut outcome = KindOutcome::default();

        let mut query = Query::new(endpoint(kind)).param("changesSince", format_timestamp(since));
        if kind == ResourceKind::Invoices {
            query.set("fields", INVOICE_FIELDS);
        }

        let changes = self.fetch_paged(query.clone(), identity)?;
        outcome.fetched = changes.len();
        let deleted = self.fetch_deleted(kind, query, identity);
        outcome.deleted = deleted.len();

        if changes.is_empty() && deleted.is_empty() {
            info!(
                "No {} changes found (not updating lastSync)",
                kind.label().to_lowercase()
            );
            return Ok(outcome);
        }

        let booked: Vec<Record> = changes
            .iter()
            .filter(|record| kind == ResourceKind::Invoices && is_booked(record))
            .cloned()
            .collect();

        if !changes.is_empty() {
            let merged = reconcile(baseline, changes);
            outcome.updated = merged.updated;
            outcome.added = merged.added;
            info!(
                "Updated {} {}, added {} new",
                merged.updated,
                kind.label().to_lowercase(),
                merged.added
            );
            self.archive.write_collection(&path, &merged.records)?;
        }

        if !deleted.is_empty() {
            self.persist_deleted(kind, deleted)?;
        }

        for invoice in &booked {
            self.download_invoice_pdf(invoice, &mut outcome);
        }

        self.commit(kind, now, &mut outcome)?;
        Ok(outcome)
    }

    /// Fetches the deletes-only change set. Failures degrade to no deletes.
    fn fetch_deleted(&self, kind: ResourceKind, mut query: Query, identity: &str) -> Vec<Record> {
        query.set("deletedOnly", "true");
        match self.fetch_paged(query, identity) {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    kind = %kind,
                    "Fetching deleted {} failed, skipping deletes this run: {}",
                    kind.label().to_lowercase(),
                    e
                );
                Vec::new()
            }
        }
    }

    fn persist_deleted(&mut self, kind: ResourceKind, deleted: Vec<Record>) -> SyncResult<()> {
        let identity = identity_of(kind)?;
        let path = self.archive.deleted_path(kind);
        let baseline = match self.archive.load_collection(&path, identity) {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                warn!(kind = %kind, "{}, rebuilding deleted collection", e);
                Vec::new()
            }
        };
        let merged = reconcile(baseline, deleted);
        self.archive.write_collection(&path, &merged.records)
    }

    fn download_invoice_pdf(&mut self, invoice: &Record, outcome: &mut KindOutcome) {
        let name = match invoice.get("Number").and_then(number_label) {
            Some(number) => format!("{number}.pdf"),
            None => format!("{}.pdf", invoice.id()),
        };
        let path = self.archive.file_path(ResourceKind::Invoices, &name);
        let query = Query::new(format!("/v1/{{organizationId}}/invoices/{}", invoice.id()));
        let transport = &self.transport;

        match self.archive.download(&path, || transport.fetch_blob(&query)) {
            Ok(()) => {
                outcome.attachments += 1;
                debug!("Downloaded invoice PDF {}", name);
            }
            Err(e) => {
                outcome.attachment_failures += 1;
                warn!(invoice = invoice.id(), "Failed to download PDF {}: {}", name, e);
            }
        }
    }
}

fn is_booked(invoice: &Record) -> bool {
    invoice.get_str("Status") != Some("Draft")
}

fn number_label(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
