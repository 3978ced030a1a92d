use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Append-only record of file names that were already ingested.
///
/// `path` may be a single newline-delimited file or a folder of such files;
/// in the folder case the processed set is the union of all of them and new
/// entries go to `<folder>/<domain>_processed_files.txt`.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
    processed: HashSet<String>,
}

impl Checkpoint {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let processed = load_processed_files(&path)?;
        Ok(Self { path, processed })
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.processed.contains(filename)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// File that entries for `domain` are appended to.
    pub fn file_for(&self, domain: &str) -> PathBuf {
        if self.path.is_file() {
            self.path.clone()
        } else {
            self.path.join(format!("{}_processed_files.txt", domain))
        }
    }

    /// Appends `filename` unless already present. Never rewrites earlier lines.
    pub fn record(&mut self, domain: &str, filename: &str) -> Result<()> {
        if self.processed.contains(filename) {
            return Ok(());
        }
        let file_path = self.file_for(domain);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create checkpoint dir {:?}", parent))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .with_context(|| format!("Cannot open checkpoint file {:?}", file_path))?;
        writeln!(file, "{}", filename)
            .with_context(|| format!("Cannot append to checkpoint file {:?}", file_path))?;
        self.processed.insert(filename.to_string());
        tracing::info!("Checkpoint updated: {} -> {}", filename, file_path.display());
        Ok(())
    }
}

/// Union of the file names listed in a checkpoint file or folder.
/// A path that does not exist yet yields an empty set.
pub fn load_processed_files(path: &Path) -> Result<HashSet<String>> {
    let mut processed = HashSet::new();

    if path.is_dir() {
        let mut entries: Vec<PathBuf> = fs::read_dir(path)
            .with_context(|| format!("Cannot read checkpoint dir {:?}", path))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        entries.sort();
        for file in entries {
            let names = read_lines(&file)?;
            tracing::info!(
                "Loaded checkpoint file {} ({} entries)",
                file.display(),
                names.len()
            );
            processed.extend(names);
        }
    } else if path.is_file() {
        processed.extend(read_lines(path)?);
        tracing::info!(
            "Loaded checkpoint file {} ({} entries)",
            path.display(),
            processed.len()
        );
    } else {
        tracing::warn!(
            "No checkpoint found at {}, starting with an empty set",
            path.display()
        );
    }

    Ok(processed)
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Cannot read checkpoint {:?}", path))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect())
}
