//! Accounting periods and the backfill router.
//!
//! Period-scoped kinds keep one collection per accounting year. A period
//! starts `Uninitialized` and is fetched in full once; after that fetch is
//! persisted it is `Initialized` for good and only receives deltas from the
//! combined change query, routed to it by each record's date.

use crate::archive::Archive;
use crate::checkpoint::CheckpointStore;
use crate::error::SyncResult;
use crate::kind::ResourceKind;
use crate::record::{collection_items, Record};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// An accounting period with inclusive date bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period {
    /// Period identifier (the accounting year).
    pub id: i32,
    /// First day.
    pub start: NaiveDate,
    /// Last day.
    pub end: NaiveDate,
}

impl Period {
    /// A calendar-year period.
    pub fn calendar_year(year: i32) -> Option<Self> {
        Some(Self {
            id: year,
            start: NaiveDate::from_ymd_opt(year, 1, 1)?,
            end: NaiveDate::from_ymd_opt(year, 12, 31)?,
        })
    }

    /// Returns true if `date` falls inside the period.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// An accounting year as returned by the API.
///
/// Older and newer API versions disagree on field casing, so both are read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountingYear {
    /// Start date (PascalCase variant).
    #[serde(rename = "FromDate", default)]
    pub from_date: Option<String>,
    /// Start date (camelCase variant).
    #[serde(rename = "dateStart", default)]
    pub date_start: Option<String>,
    /// End date (PascalCase variant).
    #[serde(rename = "ToDate", default)]
    pub to_date: Option<String>,
    /// End date (camelCase variant).
    #[serde(rename = "dateEnd", default)]
    pub date_end: Option<String>,
    /// Display name, usually the year.
    #[serde(rename = "Name", alias = "name", default)]
    pub name: Option<String>,
}

impl AccountingYear {
    /// Start date, if present and valid.
    pub fn start(&self) -> Option<NaiveDate> {
        first_date(&[&self.from_date, &self.date_start])
    }

    /// End date, if present and valid.
    pub fn end(&self) -> Option<NaiveDate> {
        first_date(&[&self.to_date, &self.date_end])
    }

    /// The period identifier: the numeric name, else the end date's year.
    pub fn id(&self) -> Option<i32> {
        self.name
            .as_deref()
            .and_then(|name| name.trim().parse().ok())
            .or_else(|| self.end().map(|end| end.year()))
    }

    /// The name used in report paths: the name as given, else the end
    /// date's year.
    pub fn label(&self) -> Option<String> {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Some(name.to_string()),
            _ => self.end().map(|end| end.year().to_string()),
        }
    }

    /// Converts to a period, defaulting missing bounds to the calendar year.
    pub fn to_period(&self) -> Option<Period> {
        let id = self.id()?;
        let calendar = Period::calendar_year(id)?;
        Some(Period {
            id,
            start: self.start().unwrap_or(calendar.start),
            end: self.end().unwrap_or(calendar.end),
        })
    }
}

fn first_date(candidates: &[&Option<String>]) -> Option<NaiveDate> {
    candidates
        .iter()
        .filter_map(|value| value.as_deref())
        .find_map(parse_date)
}

/// Parses the date part of a `YYYY-MM-DD[...]` string.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let day = value.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Decodes the accounting years endpoint.
pub fn accounting_years_from_body(body: Value) -> SyncResult<Vec<AccountingYear>> {
    collection_items(body)?
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(Into::into))
        .collect()
}

/// Converts accounting years into periods, sorted by id.
///
/// Years with neither a numeric name nor an end date are skipped.
pub fn periods_from_years(years: &[AccountingYear]) -> Vec<Period> {
    let mut periods: BTreeMap<i32, Period> = BTreeMap::new();
    for year in years {
        match year.to_period() {
            Some(period) => {
                periods.insert(period.id, period);
            }
            None => debug!("Skipping accounting year with no name or end date: {:?}", year),
        }
    }
    periods.into_values().collect()
}

/// Decodes the accounting years endpoint into periods, sorted by id.
pub fn periods_from_body(body: Value) -> SyncResult<Vec<Period>> {
    Ok(periods_from_years(&accounting_years_from_body(body)?))
}

/// Backfill state of one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodState {
    /// Never fully fetched.
    Uninitialized,
    /// Fully fetched and persisted at least once. Terminal.
    Initialized,
}

/// Why a period needs a full fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillReason {
    /// First time the period is seen.
    FirstRun,
    /// The period is initialized but its collection file is gone or unreadable.
    MissingBaseline,
}

/// Decision for a single run.
#[derive(Debug, Default)]
pub struct PeriodPlan {
    /// Periods fetched in full this run.
    pub backfill: Vec<(Period, BackfillReason)>,
    /// Initialized periods with their persisted baselines.
    pub incremental: Vec<(Period, Vec<Record>)>,
}

/// Records of a combined change-set grouped by owning period.
#[derive(Debug, Default)]
pub struct Routed {
    /// Records per period id, in change-set order.
    pub buckets: BTreeMap<i32, Vec<Record>>,
    /// Records whose date is missing, unparseable or outside every period.
    pub unroutable: Vec<Record>,
}

/// Decides between full and incremental fetches per period.
#[derive(Debug, Clone)]
pub struct PeriodRouter {
    kind: ResourceKind,
    periods: Vec<Period>,
}

impl PeriodRouter {
    /// Creates a router for `kind` over `periods`.
    pub fn new(kind: ResourceKind, periods: Vec<Period>) -> Self {
        Self { kind, periods }
    }

    /// Returns the known periods.
    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    /// Returns the state of `period`.
    pub fn state(store: &CheckpointStore, period: i32) -> PeriodState {
        if store.is_period_initialized(period) {
            PeriodState::Initialized
        } else {
            PeriodState::Uninitialized
        }
    }

    /// Plans the run: which periods to backfill and which to merge into.
    ///
    /// Initialized periods whose baseline collection is missing or corrupt
    /// fall back to a full fetch of that single period.
    pub fn plan(&self, store: &CheckpointStore, archive: &Archive) -> PeriodPlan {
        let mut plan = PeriodPlan::default();
        let identity = self.kind.identity_field().unwrap_or("Guid");

        for period in &self.periods {
            if Self::state(store, period.id) == PeriodState::Uninitialized {
                plan.backfill.push((*period, BackfillReason::FirstRun));
                continue;
            }

            let path = archive.period_path(self.kind, period.id);
            match archive.load_collection(&path, identity) {
                Ok(Some(baseline)) => plan.incremental.push((*period, baseline)),
                Ok(None) => {
                    warn!(
                        period = period.id,
                        "Baseline {} missing, re-running full fetch",
                        path.display()
                    );
                    plan.backfill.push((*period, BackfillReason::MissingBaseline));
                }
                Err(e) => {
                    warn!(period = period.id, "{}, re-running full fetch", e);
                    plan.backfill.push((*period, BackfillReason::MissingBaseline));
                }
            }
        }
        plan
    }

    /// Returns the period owning `date`.
    pub fn period_for(&self, date: NaiveDate) -> Option<&Period> {
        self.periods.iter().find(|period| period.contains(date))
    }

    /// Groups `changes` by the period owning each record's `date_field`.
    pub fn route(&self, changes: Vec<Record>, date_field: &str) -> Routed {
        let mut routed = Routed::default();
        for record in changes {
            let owner = record
                .get_str(date_field)
                .and_then(parse_date)
                .and_then(|date| self.period_for(date));
            match owner {
                Some(period) => routed.buckets.entry(period.id).or_default().push(record),
                None => routed.unroutable.push(record),
            }
        }
        routed
    }
}
