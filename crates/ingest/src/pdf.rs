use std::path::Path;

use anyhow::{anyhow, Result};

/// Source of the text layer of a PDF.
pub trait PdfText {
    fn extract(&self, path: &Path) -> Result<String>;
}

/// Text layer via `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtract;

impl PdfText for PdfExtract {
    fn extract(&self, path: &Path) -> Result<String> {
        pdf_extract::extract_text(path)
            .map_err(|e| anyhow!("Failed to extract text from {}: {}", path.display(), e))
    }
}

/// Extracted text with whitespace runs collapsed to single spaces,
/// cut to at most `max_chars` characters.
pub fn document_text(source: &dyn PdfText, path: &Path, max_chars: usize) -> Result<String> {
    let text = source.extract(path)?;
    let cleaned = collapse_whitespace(&text);
    if cleaned.is_empty() {
        return Err(anyhow!("{} has no text layer", path.display()));
    }
    let total = cleaned.chars().count();
    if total > max_chars {
        tracing::info!(
            "Truncating text of {} from {} to {} chars",
            path.display(),
            total,
            max_chars
        );
    }
    Ok(truncate_chars(&cleaned, max_chars))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl PdfText for Fixed {
        fn extract(&self, _path: &Path) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Totale\n\n da\tpagare  "), "Totale da pagare");
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let text = document_text(&Fixed("perché   è così"), Path::new("x.pdf"), 8).unwrap();
        assert_eq!(text, "perché è");
    }

    #[test]
    fn test_empty_text_layer_is_an_error() {
        assert!(document_text(&Fixed(" \n "), Path::new("scan.pdf"), 100).is_err());
    }
}
