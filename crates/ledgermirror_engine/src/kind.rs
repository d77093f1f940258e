//! Resource kinds mirrored from the accounting API.

use std::fmt;
use std::str::FromStr;

/// One category of remote data.
///
/// The declaration order is the order in which a run processes kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// Balance, result and saldo reports per accounting year.
    Reports,
    /// Sales invoices.
    Invoices,
    /// Sales credit notes.
    CreditNotes,
    /// Ledger entries, scoped by accounting year.
    Entries,
    /// Uploaded voucher files.
    Vouchers,
    /// Contacts.
    Contacts,
}

impl ResourceKind {
    /// Every kind, in processing order.
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Reports,
        ResourceKind::Invoices,
        ResourceKind::CreditNotes,
        ResourceKind::Entries,
        ResourceKind::Vouchers,
        ResourceKind::Contacts,
    ];

    /// Key under `lastSync` in the checkpoint file.
    pub fn checkpoint_key(&self) -> &'static str {
        match self {
            ResourceKind::Reports => "reports",
            ResourceKind::Invoices => "invoices",
            ResourceKind::CreditNotes => "creditNotes",
            ResourceKind::Entries => "entries",
            ResourceKind::Vouchers => "vouchers",
            ResourceKind::Contacts => "contacts",
        }
    }

    /// Identity field used as the merge key, if the kind is merged at all.
    pub fn identity_field(&self) -> Option<&'static str> {
        match self {
            ResourceKind::Reports => None,
            ResourceKind::Invoices | ResourceKind::CreditNotes => Some("Guid"),
            ResourceKind::Entries => Some("EntryGuid"),
            ResourceKind::Vouchers => Some("FileGuid"),
            ResourceKind::Contacts => Some("ContactGuid"),
        }
    }

    /// Directory below the output root holding this kind's files.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ResourceKind::Reports => "reports",
            ResourceKind::Invoices => "invoices",
            ResourceKind::CreditNotes => "creditnotes",
            ResourceKind::Entries => "entries",
            ResourceKind::Vouchers => "files",
            ResourceKind::Contacts => "contacts",
        }
    }

    /// Human readable label for logs and the `state` command.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Reports => "Reports",
            ResourceKind::Invoices => "Invoices",
            ResourceKind::CreditNotes => "Credit Notes",
            ResourceKind::Entries => "Entries",
            ResourceKind::Vouchers => "Vouchers",
            ResourceKind::Contacts => "Contacts",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reports" => Ok(ResourceKind::Reports),
            "invoices" => Ok(ResourceKind::Invoices),
            "creditnotes" | "credit-notes" => Ok(ResourceKind::CreditNotes),
            "entries" => Ok(ResourceKind::Entries),
            "vouchers" | "files" => Ok(ResourceKind::Vouchers),
            "contacts" => Ok(ResourceKind::Contacts),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}
