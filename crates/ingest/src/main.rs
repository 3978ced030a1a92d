use std::path::PathBuf;

use ai_client::{OllamaClient, OllamaClientConfig};
use anyhow::{Context, Result};
use clap::Parser;
use ingest::{attach_remotes, load_settings_or_default, Driver, PdfExtract, Secrets};

#[derive(Parser, Debug)]
#[command(
    name = "ingest",
    about = "Ingest bank exports, payslips, utility bills and mobility statements into history tables."
)]
struct Args {
    /// Settings JSON (paths, account metadata, mirrors)
    #[arg(short, long, default_value = ingest::config::DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    /// Overrides `input_dir` from settings
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Overrides `output_dir` from settings
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Overrides `checkpoint_path` from settings
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Overrides `max_pdf_chars` from settings
    #[arg(long)]
    max_pdf_chars: Option<usize>,

    /// Transform and log records without writing anything
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    logger::init(args.log_level.as_deref());

    let mut settings = load_settings_or_default(&args.settings)?;
    if let Some(dir) = args.input_dir {
        settings.input_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        settings.output_dir = dir;
    }
    if let Some(path) = args.checkpoint {
        settings.checkpoint_path = path;
    }
    if let Some(max) = args.max_pdf_chars {
        settings.max_pdf_chars = max;
    }

    let agent = OllamaClient::new(OllamaClientConfig::from_env())
        .context("Failed to set up the extraction agent")?;
    tracing::info!("Extraction agent: ollama ({})", agent.model());

    let mut driver =
        Driver::new(&settings, Box::new(agent), Box::new(PdfExtract))?.with_dry_run(args.dry_run);
    if args.dry_run {
        tracing::info!("Dry run: no history, mirror or checkpoint writes");
    } else {
        let secrets = Secrets::from_env();
        let attached = attach_remotes(&mut driver, &settings, &secrets);
        tracing::info!("{} mirror table(s) attached", attached);
    }

    let report = driver.run()?;
    println!(
        "Processed {} file(s), skipped {}, failed {}",
        report.processed, report.skipped, report.failed
    );
    Ok(())
}
