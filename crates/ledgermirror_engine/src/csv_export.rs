//! CSV rendering of ledger entries, matching the accounting system's own
//! export (semicolon separated, Danish number format, CRLF, UTF-8 BOM).

use crate::error::{SyncError, SyncResult};
use crate::record::Record;
use csv::{Terminator, WriterBuilder};
use serde::Deserialize;
use std::collections::HashMap;

const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

const HEADER: [&str; 9] = [
    "Konto",
    "Kontonavn",
    "Dato",
    "Bilag",
    "Bilagstype",
    "Tekst",
    "Momstype",
    "Beløb",
    "Saldo",
];

/// The fields of a ledger entry used by the CSV export.
///
/// Every field may be missing or `null`; numbers then count as zero.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Entry {
    account_number: Option<i64>,
    account_name: Option<String>,
    date: Option<String>,
    voucher_number: Option<i64>,
    voucher_type: Option<String>,
    description: Option<String>,
    vat_type: Option<String>,
    amount: Option<f64>,
    #[serde(rename = "Type")]
    entry_type: Option<String>,
}

/// Renders entries as CSV, sorted by account number then date, with a
/// running balance per account.
pub fn entries_to_csv(records: &[Record]) -> SyncResult<Vec<u8>> {
    let mut entries = records
        .iter()
        .map(|record| serde_json::from_value::<Entry>(record.value().clone()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SyncError::Decode(format!("failed to parse entry: {e}")))?;

    entries.sort_by(|a, b| {
        a.account()
            .cmp(&b.account())
            .then_with(|| a.date.cmp(&b.date))
    });

    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .terminator(Terminator::CRLF)
        .from_writer(BOM.to_vec());

    writer.write_record(HEADER).map_err(csv_error)?;

    let mut balances: HashMap<i64, f64> = HashMap::new();
    for entry in &entries {
        let amount = entry.amount.unwrap_or_default();
        let balance = balances.entry(entry.account()).or_insert(0.0);
        *balance += amount;

        writer
            .write_record([
                entry.account().to_string(),
                entry.account_name.clone().unwrap_or_default(),
                entry.date.clone().unwrap_or_default(),
                entry
                    .voucher_number
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
                voucher_type_label(entry.voucher_type.as_deref(), entry.entry_type.as_deref())
                    .to_string(),
                entry.description.clone().unwrap_or_default(),
                entry.vat_type.clone().unwrap_or_default(),
                format_danish_number(amount),
                format_danish_number(*balance),
            ])
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| SyncError::Decode(format!("failed to flush CSV: {e}")))
}

impl Entry {
    fn account(&self) -> i64 {
        self.account_number.unwrap_or_default()
    }
}

fn csv_error(err: csv::Error) -> SyncError {
    SyncError::Decode(format!("failed to write CSV: {err}"))
}

/// Maps an API voucher type to the label used by the accounting system.
fn voucher_type_label<'a>(voucher_type: Option<&'a str>, entry_type: Option<&str>) -> &'a str {
    if entry_type == Some("Primo") {
        return "---";
    }
    match voucher_type {
        None => "---",
        Some("Sales") => "Salgsfaktura",
        Some("Purchases") => "Køb",
        Some("manuel") => "Finansbilag",
        Some(other) => other,
    }
}

/// Formats with two decimals, `,` as decimal and `.` as thousands separator.
pub fn format_danish_number(n: f64) -> String {
    let fixed = format!("{:.2}", n);
    let (int_part, dec_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let (negative, digits) = match int_part.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, int_part),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    format!("{}{},{}", if negative { "-" } else { "" }, grouped, dec_part)
}
