//! # LedgerMirror Engine
//!
//! Incremental synchronization and reconciliation of an accounting API into
//! a local file archive.
//!
//! This crate provides:
//! - Checkpoint store (per-kind timestamps, initialized accounting years)
//! - Window planner for bounded change queries
//! - Order-preserving reconciler and last-write-wins accumulator
//! - Period backfill router for year-scoped resources
//! - Sync orchestrator with a dry-run mode
//! - Transport abstraction with an HTTP adapter and a mock
//!
//! ## Key Invariants
//!
//! - A checkpoint only advances after the data it covers is persisted
//! - A run that found nothing does not advance a checkpoint
//! - Merging the same changes twice equals merging once
//! - A failing window leaves the kind exactly as it was before the run
//! - Preview runs take the same code path with every effect skipped

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;
mod checkpoint;
mod config;
mod csv_export;
mod engine;
mod error;
mod http;
mod kind;
mod period;
mod record;
mod reconcile;
mod resources;
mod transport;
mod window;

pub use archive::{Archive, Effect, RunMode};
pub use checkpoint::{default_epoch, format_timestamp, CheckpointStore, CHECKPOINT_FILE};
pub use config::SyncConfig;
pub use csv_export::{entries_to_csv, format_danish_number};
pub use engine::{KindOutcome, KindReport, RunReport, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpRequest, HttpResponse, HttpTransport, ORGANIZATION_PLACEHOLDER};
pub use kind::ResourceKind;
pub use period::{
    accounting_years_from_body, parse_date, periods_from_body, periods_from_years, AccountingYear,
    BackfillReason, Period, PeriodPlan, PeriodRouter, PeriodState, Routed,
};
pub use record::{collection_items, records_from_body, records_from_items, Record};
pub use reconcile::{merge, reconcile, Accumulator, Reconciliation};
pub use transport::{MockTransport, Query, Transport};
pub use window::{max_window_span, plan, Window, WindowPlan, MAX_WINDOW_DAYS};
