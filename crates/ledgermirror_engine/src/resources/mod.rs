//! Per-kind sync strategies.
//!
//! Each module adds the `sync_*` step of one resource kind to
//! [`SyncEngine`](crate::SyncEngine).

mod contacts;
mod entries;
mod files;
mod reports;
mod sales;
