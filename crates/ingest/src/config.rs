//! Run configuration: `settings.json` for paths and per-domain metadata,
//! environment variables for secrets and service URLs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bank_transactions::BankAccounts;
use payslips::PayslipSettings;
use serde::Deserialize;

pub const DEFAULT_SETTINGS_PATH: &str = "settings.json";
pub const DEFAULT_MAX_PDF_CHARS: usize = 8000;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Folder of `<domain>_processed_files.txt` files, or a single file.
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    #[serde(default = "default_max_pdf_chars")]
    pub max_pdf_chars: usize,
    #[serde(default)]
    pub bank_accounts: BankAccounts,
    #[serde(default)]
    pub payslips: PayslipSettings,
    #[serde(default)]
    pub airtable: Option<AirtableSettings>,
    #[serde(default)]
    pub postgres: PostgresSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            checkpoint_path: default_checkpoint_path(),
            max_pdf_chars: default_max_pdf_chars(),
            bank_accounts: BankAccounts::default(),
            payslips: PayslipSettings::default(),
            airtable: None,
            postgres: PostgresSettings::default(),
        }
    }
}

/// Airtable base plus one table id per domain (keyed by domain name).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AirtableSettings {
    pub base_id: String,
    #[serde(default)]
    pub tables: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostgresSettings {
    #[serde(default)]
    pub enabled: bool,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("data/input")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/output")
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("data/checkpoints")
}

fn default_max_pdf_chars() -> usize {
    DEFAULT_MAX_PDF_CHARS
}

/// Loads settings from a JSON file.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Reading settings file: {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing settings JSON in {}", path.display()))?;
    Ok(settings)
}

/// Like [`load_settings`], but a missing file yields the defaults.
/// A file that exists and does not parse is still an error.
pub fn load_settings_or_default<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!(
            "Settings file {} not found, using defaults",
            path.display()
        );
        return Ok(Settings::default());
    }
    load_settings(path)
}

/// Secrets and service locations read from the environment (after `.env`).
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub airtable_token: Option<String>,
    pub database_url: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            airtable_token: non_empty_var("AIRTABLE_TOKEN"),
            database_url: non_empty_var("DATABASE_URL"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
