use std::fmt;
use std::path::Path;

use utils::DomainSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    BankTransactions,
    MobilitySubscription,
    UtilityBills,
    Payslips,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::BankTransactions,
        Domain::MobilitySubscription,
        Domain::UtilityBills,
        Domain::Payslips,
    ];

    /// Name used for checkpoint files and settings keys.
    pub fn name(self) -> &'static str {
        match self {
            Domain::BankTransactions => bank_transactions::PARSER_NAME,
            Domain::MobilitySubscription => mobility_subscription::PARSER_NAME,
            Domain::UtilityBills => utility_bills::PARSER_NAME,
            Domain::Payslips => payslips::PARSER_NAME,
        }
    }

    /// Folder-name tokens (lowercase) that route a file to this domain.
    pub fn folder_tokens(self) -> &'static [&'static str] {
        match self {
            Domain::BankTransactions => &["bank_transactions", "banca"],
            Domain::MobilitySubscription => &["berebel", "mobility"],
            Domain::UtilityBills => &["light_bills", "bollette", "utility"],
            Domain::Payslips => &["salary", "payslip", "buste_paga"],
        }
    }

    pub fn schema(self) -> &'static DomainSchema {
        match self {
            Domain::BankTransactions => &bank_transactions::SCHEMA,
            Domain::MobilitySubscription => &mobility_subscription::SCHEMA,
            Domain::UtilityBills => &utility_bills::SCHEMA,
            Domain::Payslips => &payslips::SCHEMA,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Csv,
    Pdf,
}

impl SourceKind {
    /// Case-insensitive extension match; anything else is not ingested.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(SourceKind::Csv),
            "pdf" => Some(SourceKind::Pdf),
            _ => None,
        }
    }
}

/// Domain of a file, from its containing folder path relative to the input root.
pub fn classify(path: &Path, input_root: &Path) -> Option<Domain> {
    let relative = path.strip_prefix(input_root).unwrap_or(path);
    let folder = relative.parent()?.to_string_lossy().to_lowercase();
    if folder.is_empty() {
        return None;
    }
    Domain::ALL
        .into_iter()
        .find(|d| d.folder_tokens().iter().any(|t| folder.contains(t)))
}
