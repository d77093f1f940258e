//! Contacts: paged `changesSince` fetch merged into one collection.

use crate::checkpoint::format_timestamp;
use crate::engine::{identity_of, KindOutcome, SyncEngine};
use crate::error::SyncResult;
use crate::kind::ResourceKind;
use crate::reconcile::reconcile;
use crate::transport::{Query, Transport};
use chrono::{DateTime, Utc};
use tracing::info;

const CONTACTS_PATH: &str = "/v2/{organizationId}/contacts";

impl<T: Transport> SyncEngine<T> {
    pub(crate) fn sync_contacts(&mut self, now: DateTime<Utc>) -> SyncResult<KindOutcome> {
        let kind = ResourceKind::Contacts;
        let path = self.archive.collection_path(kind);
        let (baseline, since) = self.load_baseline(kind, &path)?;
        let mut outcome = KindOutcome::default();

        info!("Fetching contacts changed since {}", format_timestamp(since));
        let query = Query::new(CONTACTS_PATH).param("changesSince", format_timestamp(since));
        let changes = self.fetch_paged(query, identity_of(kind)?)?;
        outcome.fetched = changes.len();

        if changes.is_empty() {
            info!("No contact changes found (not updating lastSync)");
            return Ok(outcome);
        }

        let merged = reconcile(baseline, changes);
        outcome.updated = merged.updated;
        outcome.added = merged.added;
        info!(
            "Updated {} contacts, added {} new contacts",
            merged.updated, merged.added
        );

        self.archive.write_collection(&path, &merged.records)?;
        self.commit(kind, now, &mut outcome)?;
        Ok(outcome)
    }
}
