//! The ingestion loop: walk, classify, extract, transform, store, checkpoint.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use ai_client::{extract_records, ExtractionAgent};
use anyhow::{Context, Result};
use bank_transactions::BankTransactionsParser;
use mobility_subscription::MobilitySubscriptionParser;
use payslips::PayslipsParser;
use utility_bills::UtilityBillsParser;
use utils::parsing::extract_date_from_filename;
use utils::{
    history_path, read_csv_records, transform_batch, upsert_remote, upsert_to_csv, Checkpoint,
    DocumentDomain, RawRecord, RemoteTable, TransformContext,
};
use walkdir::WalkDir;

use crate::classify::{classify, Domain, SourceKind};
use crate::config::Settings;
use crate::pdf::{document_text, PdfText};

/// Totals of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Processed,
    Skipped,
}

pub struct Driver {
    input_dir: PathBuf,
    output_dir: PathBuf,
    max_pdf_chars: usize,
    dry_run: bool,
    checkpoint: Checkpoint,
    agent: Box<dyn ExtractionAgent>,
    pdf_text: Box<dyn PdfText>,
    remotes: HashMap<Domain, Vec<Box<dyn RemoteTable>>>,
    bank: BankTransactionsParser,
    mobility: MobilitySubscriptionParser,
    utility: UtilityBillsParser,
    payslips: PayslipsParser,
}

impl Driver {
    pub fn new(
        settings: &Settings,
        agent: Box<dyn ExtractionAgent>,
        pdf_text: Box<dyn PdfText>,
    ) -> Result<Self> {
        let checkpoint = Checkpoint::load(&settings.checkpoint_path)?;
        tracing::info!(
            "{} file(s) already processed according to {}",
            checkpoint.len(),
            settings.checkpoint_path.display()
        );

        for domain in Domain::ALL {
            domain
                .schema()
                .validate()
                .with_context(|| format!("Invalid schema for {}", domain))?;
        }

        Ok(Self {
            input_dir: settings.input_dir.clone(),
            output_dir: settings.output_dir.clone(),
            max_pdf_chars: settings.max_pdf_chars,
            dry_run: false,
            checkpoint,
            agent,
            pdf_text,
            remotes: HashMap::new(),
            bank: BankTransactionsParser::new(settings.bank_accounts.clone()),
            mobility: MobilitySubscriptionParser::new(),
            utility: UtilityBillsParser::new(),
            payslips: PayslipsParser::new(settings.payslips.clone()),
        })
    }

    /// Transform and log only: no sink writes, no checkpoint updates.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn add_remote(&mut self, domain: Domain, table: Box<dyn RemoteTable>) {
        tracing::info!("{}: mirroring to {}", domain, table.describe());
        self.remotes.entry(domain).or_default().push(table);
    }

    /// Processes every eligible file under the input folder, one at a time.
    /// A failing file is logged and counted; the walk always continues.
    pub fn run(&mut self) -> Result<RunReport> {
        let files = self.collect_files()?;
        tracing::info!(
            "Found {} candidate file(s) under {}",
            files.len(),
            self.input_dir.display()
        );

        let mut report = RunReport::default();
        for path in files {
            match self.process_file(&path) {
                Ok(FileOutcome::Processed) => report.processed += 1,
                Ok(FileOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    tracing::error!("Failed to process {}: {:#}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Run completed: {} processed, {} skipped, {} failed",
            report.processed,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    fn collect_files(&self) -> Result<Vec<PathBuf>> {
        if !self.input_dir.is_dir() {
            anyhow::bail!("Input folder {} does not exist", self.input_dir.display());
        }
        let excluded = self.nested_output_dir();
        let files = WalkDir::new(&self.input_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| {
                e.depth() == 0
                    || excluded
                        .as_ref()
                        .map_or(true, |dir| !e.path().starts_with(dir))
            })
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("Skipping unreadable entry: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && SourceKind::from_path(e.path()).is_some())
            .map(|e| e.into_path())
            .collect();
        Ok(files)
    }

    /// The output folder as seen from the walk, when it lies strictly inside
    /// the input folder. History files there must not be ingested again.
    fn nested_output_dir(&self) -> Option<PathBuf> {
        let input = self.input_dir.canonicalize().ok()?;
        let output = self.output_dir.canonicalize().ok()?;
        let relative = output.strip_prefix(&input).ok()?;
        if relative.as_os_str().is_empty() {
            return None;
        }
        Some(self.input_dir.join(relative))
    }

    fn process_file(&mut self, path: &Path) -> Result<FileOutcome> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if self.checkpoint.contains(&filename) {
            tracing::info!("Skipping {}: already processed", filename);
            return Ok(FileOutcome::Skipped);
        }

        let Some(domain) = classify(path, &self.input_dir) else {
            tracing::warn!("Skipping {}: folder does not match any domain", path.display());
            return Ok(FileOutcome::Skipped);
        };
        let Some(kind) = SourceKind::from_path(path) else {
            return Ok(FileOutcome::Skipped);
        };

        tracing::info!("Processing {} as {} ({:?})", path.display(), domain, kind);

        let statement_date = extract_date_from_filename(&filename).map(|(date, _)| date);
        let ctx = TransformContext::new(filename.clone(), statement_date);

        let raw = self.read_raw(domain, kind, path)?;
        let records = transform_batch(self.domain_impl(domain), raw, &ctx);
        let schema = domain.schema();

        if self.dry_run {
            for record in &records {
                tracing::info!("[dry-run] {} {}", schema.name, record.to_json());
            }
            return Ok(FileOutcome::Processed);
        }

        let history = history_path(&self.output_dir, schema);
        let stats = upsert_to_csv(&history, schema, &records)
            .with_context(|| format!("Failed to update {}", history.display()))?;
        tracing::info!(
            "{}: {} added, {} skipped of {} record(s)",
            history.display(),
            stats.added,
            stats.skipped,
            stats.total
        );

        if let Some(tables) = self.remotes.get_mut(&domain) {
            for table in tables.iter_mut() {
                match upsert_remote(table.as_mut(), schema, &records) {
                    Ok(s) => tracing::info!(
                        "{}: {} added, {} skipped, {} failed",
                        table.describe(),
                        s.added,
                        s.skipped,
                        s.failed
                    ),
                    Err(e) => tracing::error!("{} sync failed: {:#}", table.describe(), e),
                }
            }
        }

        self.checkpoint.record(domain.name(), &filename)?;
        Ok(FileOutcome::Processed)
    }

    fn read_raw(&self, domain: Domain, kind: SourceKind, path: &Path) -> Result<Vec<RawRecord>> {
        match kind {
            SourceKind::Csv => {
                let file =
                    File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
                match domain {
                    Domain::BankTransactions => self.bank.parse_reader(file),
                    _ => read_csv_records(file),
                }
            }
            SourceKind::Pdf => {
                let text = document_text(self.pdf_text.as_ref(), path, self.max_pdf_chars)?;
                extract_records(
                    self.agent.as_ref(),
                    &text,
                    domain.schema().extraction_fields,
                )
            }
        }
    }

    fn domain_impl(&self, domain: Domain) -> &dyn DocumentDomain {
        match domain {
            Domain::BankTransactions => &self.bank,
            Domain::MobilitySubscription => &self.mobility,
            Domain::UtilityBills => &self.utility,
            Domain::Payslips => &self.payslips,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::fs;
    use std::rc::Rc;

    use anyhow::anyhow;
    use utils::{CanonicalRecord, DomainSchema};

    /// Agent that answers every request with the same reply.
    struct CannedAgent(String);

    impl ExtractionAgent for CannedAgent {
        fn describe(&self) -> String {
            "canned agent".to_string()
        }

        fn ask(&self, _document_text: &str, _fields: &[&str]) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    /// Reads "PDF" fixtures as plain text.
    struct PlainText;

    impl PdfText for PlainText {
        fn extract(&self, path: &Path) -> Result<String> {
            Ok(fs::read_to_string(path)?)
        }
    }

    /// Remote table whose state outlives the driver.
    struct SharedTable {
        keys: Rc<RefCell<HashSet<String>>>,
        fail_fetch: bool,
    }

    impl RemoteTable for SharedTable {
        fn describe(&self) -> String {
            "shared table".to_string()
        }

        fn fetch_existing_keys(&mut self, _key_column: &str) -> Result<HashSet<String>> {
            if self.fail_fetch {
                return Err(anyhow!("remote unavailable"));
            }
            Ok(self.keys.borrow().clone())
        }

        fn insert_record(&mut self, schema: &DomainSchema, record: &CanonicalRecord) -> Result<()> {
            self.keys.borrow_mut().insert(record.key(schema));
            Ok(())
        }
    }

    const ING_CSV: &str = "DATA CONTABILE;DATA VALUTA;USCITE;ENTRATE;CAUSALE;DESCRIZIONE OPERAZIONE\n\
                           01/11/2024;01/11/2024;;;;Saldo iniziale\n\
                           05/11/2024;05/11/2024;-50,00;;PAGAMENTO POS;Spesa supermercato\n";

    const BILL_REPLY: &str = "```json\n{\"fornitore\": \"Enel\", \"numero_fattura\": \"F-1\", \"data_fattura\": \"2024-10-05\", \"totale_da_pagare\": 80.0}\n```";

    struct Fixture {
        _dir: tempfile::TempDir,
        settings: Settings,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("in/banca")).unwrap();
        fs::create_dir_all(root.join("in/bollette")).unwrap();
        fs::create_dir_all(root.join("in/altro")).unwrap();
        fs::write(root.join("in/banca/movimenti_novembre2024.csv"), ING_CSV).unwrap();
        fs::write(root.join("in/bollette/enel_ottobre2024.pdf"), "Bolletta Enel F-1").unwrap();
        fs::write(root.join("in/altro/random.csv"), "a;b\n1;2\n").unwrap();
        fs::write(root.join("in/banca/readme.txt"), "ignored").unwrap();

        let settings = Settings {
            input_dir: root.join("in"),
            output_dir: root.join("out"),
            checkpoint_path: root.join("checkpoints"),
            ..Settings::default()
        };
        Fixture {
            _dir: dir,
            settings,
        }
    }

    fn driver(settings: &Settings, reply: &str) -> Driver {
        Driver::new(
            settings,
            Box::new(CannedAgent(reply.to_string())),
            Box::new(PlainText),
        )
        .unwrap()
    }

    fn history_rows(settings: &Settings, domain: Domain) -> usize {
        let path = history_path(&settings.output_dir, domain.schema());
        fs::read_to_string(path).unwrap().lines().count() - 1
    }

    #[test]
    fn test_run_ingests_csv_and_pdf() {
        let f = fixture();
        let report = driver(&f.settings, BILL_REPLY).run().unwrap();

        assert_eq!(
            report,
            RunReport {
                processed: 2,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(history_rows(&f.settings, Domain::BankTransactions), 1);
        assert_eq!(history_rows(&f.settings, Domain::UtilityBills), 1);

        let bank_history =
            fs::read_to_string(history_path(&f.settings.output_dir, Domain::BankTransactions.schema()))
                .unwrap();
        assert!(bank_history.contains(";2024-11-01;"));
        assert!(bank_history.contains(";50.0;0.0;Spesa supermercato;PAGAMENTO POS;"));

        let cp = fs::read_to_string(
            f.settings
                .checkpoint_path
                .join("bank_transactions_processed_files.txt"),
        )
        .unwrap();
        assert_eq!(cp, "movimenti_novembre2024.csv\n");
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let f = fixture();
        driver(&f.settings, BILL_REPLY).run().unwrap();
        let bank_before =
            fs::read_to_string(history_path(&f.settings.output_dir, Domain::BankTransactions.schema()))
                .unwrap();

        let report = driver(&f.settings, BILL_REPLY).run().unwrap();

        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 3);
        let bank_after =
            fs::read_to_string(history_path(&f.settings.output_dir, Domain::BankTransactions.schema()))
                .unwrap();
        assert_eq!(bank_before, bank_after);
        let cp = fs::read_to_string(
            f.settings
                .checkpoint_path
                .join("bank_transactions_processed_files.txt"),
        )
        .unwrap();
        assert_eq!(cp.lines().count(), 1);
    }

    #[test]
    fn test_same_content_under_new_name_adds_no_rows() {
        let f = fixture();
        driver(&f.settings, BILL_REPLY).run().unwrap();
        fs::write(
            f.settings.input_dir.join("banca/copia_novembre2024.csv"),
            ING_CSV,
        )
        .unwrap();

        let report = driver(&f.settings, BILL_REPLY).run().unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(history_rows(&f.settings, Domain::BankTransactions), 1);
    }

    #[test]
    fn test_bad_agent_reply_fails_only_that_file() {
        let f = fixture();
        let report = driver(&f.settings, "Mi dispiace, non posso aiutarti.")
            .run()
            .unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        let cp = Checkpoint::load(&f.settings.checkpoint_path).unwrap();
        assert!(cp.contains("movimenti_novembre2024.csv"));
        assert!(!cp.contains("enel_ottobre2024.pdf"));
    }

    #[test]
    fn test_history_failure_blocks_checkpoint() {
        let f = fixture();
        let history = history_path(&f.settings.output_dir, Domain::BankTransactions.schema());
        fs::create_dir_all(history.parent().unwrap()).unwrap();
        fs::write(&history, "foreign;header\n").unwrap();

        let report = driver(&f.settings, BILL_REPLY).run().unwrap();

        assert_eq!(report.failed, 1);
        let cp = Checkpoint::load(&f.settings.checkpoint_path).unwrap();
        assert!(!cp.contains("movimenti_novembre2024.csv"));
        assert!(cp.contains("enel_ottobre2024.pdf"));
    }

    #[test]
    fn test_remote_failure_still_checkpoints() {
        let f = fixture();
        let keys = Rc::new(RefCell::new(HashSet::new()));
        let mut d = driver(&f.settings, BILL_REPLY);
        d.add_remote(
            Domain::BankTransactions,
            Box::new(SharedTable {
                keys: keys.clone(),
                fail_fetch: true,
            }),
        );
        d.add_remote(
            Domain::UtilityBills,
            Box::new(SharedTable {
                keys: keys.clone(),
                fail_fetch: false,
            }),
        );

        let report = d.run().unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 0);
        assert!(keys.borrow().contains("F-1"));
        assert_eq!(keys.borrow().len(), 1);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let f = fixture();
        let report = driver(&f.settings, BILL_REPLY)
            .with_dry_run(true)
            .run()
            .unwrap();

        assert_eq!(report.processed, 2);
        assert!(!f.settings.output_dir.exists());
        assert!(!f.settings.checkpoint_path.exists());
    }

    #[test]
    fn test_nested_output_folder_is_not_ingested() {
        let f = fixture();
        let settings = Settings {
            output_dir: f.settings.input_dir.join("out"),
            ..f.settings.clone()
        };
        driver(&settings, BILL_REPLY).run().unwrap();

        let report = driver(&settings, BILL_REPLY).run().unwrap();

        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 3);
    }

    #[test]
    fn test_output_folder_above_input_still_walks_input() {
        let f = fixture();
        let settings = Settings {
            output_dir: f.settings.input_dir.parent().unwrap().to_path_buf(),
            ..f.settings.clone()
        };

        let report = driver(&settings, BILL_REPLY).run().unwrap();

        assert_eq!(
            report,
            RunReport {
                processed: 2,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(history_rows(&settings, Domain::BankTransactions), 1);
    }

    #[test]
    fn test_output_folder_equal_to_input_still_walks_input() {
        let f = fixture();
        let settings = Settings {
            output_dir: f.settings.input_dir.clone(),
            ..f.settings.clone()
        };

        let report = driver(&settings, BILL_REPLY).run().unwrap();

        assert_eq!(report.processed, 2);
    }

    #[test]
    fn test_missing_input_folder_is_an_error() {
        let f = fixture();
        let settings = Settings {
            input_dir: f.settings.input_dir.join("missing"),
            ..f.settings.clone()
        };
        assert!(driver(&settings, BILL_REPLY).run().is_err());
    }
}
