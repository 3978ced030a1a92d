use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

const ITALIAN_MONTHS: [(&str, u32); 12] = [
    ("gennaio", 1),
    ("febbraio", 2),
    ("marzo", 3),
    ("aprile", 4),
    ("maggio", 5),
    ("giugno", 6),
    ("luglio", 7),
    ("agosto", 8),
    ("settembre", 9),
    ("ottobre", 10),
    ("novembre", 11),
    ("dicembre", 12),
];

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}").expect("valid year regex"))
}

fn thousands_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?[1-9]\d{0,2}(\.\d{3})+$").expect("valid thousands regex")
    })
}

/// Parses an amount in Italian/European notation ("1.234,56", "-50,00",
/// "+12,5", "€ 3,00", "-1.200") or plain notation ("1234.56", "0.125").
pub fn parse_amount(s: &str) -> Result<f64> {
    let s = s.trim();

    if s.is_empty() || s == "-" || s == "--" {
        return Err(anyhow!("Empty amount"));
    }

    let mut cleaned = s.replace('€', "").replace("EUR", "").replace(' ', "");

    // Dots are thousands separators when a decimal comma is present,
    // or when every dot is followed by a group of exactly three digits
    if cleaned.contains(',') {
        cleaned = cleaned.replace('.', "");
        cleaned = cleaned.replace(',', ".");
    } else if thousands_regex().is_match(&cleaned) {
        cleaned = cleaned.replace('.', "");
    }

    cleaned
        .parse::<f64>()
        .with_context(|| format!("Failed to parse amount: {}", s))
}

/// Magnitude of a signed amount: sign stripped, locale normalised.
pub fn parse_magnitude(s: &str) -> Result<f64> {
    let stripped: String = s.chars().filter(|c| *c != '-' && *c != '+').collect();
    parse_amount(&stripped).map(f64::abs)
}

/// Parses the date layouts found in statements and agent replies.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    // YYYY-MM-DD, optionally followed by a time part
    if let Ok(date) = NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d") {
        return Ok(date);
    }

    for fmt in ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    // MM/YYYY (month-only value dates)
    if let Ok(date) = NaiveDate::parse_from_str(&format!("01/{}", s), "%d/%m/%Y") {
        return Ok(date);
    }

    if let Some(date) = parse_italian_month_year(s) {
        return Ok(date);
    }

    Err(anyhow!("Unrecognized date format: {}", s))
}

/// First day of the month named in Italian text such as "Novembre 2024",
/// "gennaio2025" or "estratto_conto_marzo_2024.pdf".
pub fn parse_italian_month_year(s: &str) -> Option<NaiveDate> {
    let lower = s.to_lowercase();
    let month = ITALIAN_MONTHS
        .iter()
        .find(|(name, _)| lower.contains(name))
        .map(|(_, number)| *number)?;
    let year: i32 = year_regex().find(&lower)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Statement date embedded in a file name, formatted `dd-mm-yyyy`.
/// Returns `None` (and logs a warning) when no month/year is recognisable.
pub fn extract_date_from_filename(filename: &str) -> Option<(NaiveDate, String)> {
    match parse_italian_month_year(filename) {
        Some(date) => Some((date, date.format("%d-%m-%Y").to_string())),
        None => {
            tracing::warn!("Could not extract a statement date from file name: {}", filename);
            None
        }
    }
}
