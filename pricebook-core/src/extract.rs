//! The conversion pipeline: PDF bytes → text lines → price book → JSON.

use std::path::Path;

use crate::config::{ConflictPolicy, ExtractConfig};
use crate::content::{extract_text, ExtractedText};
use crate::error::{PricebookError, Result};
use crate::pricebook::{ExtractSummary, PriceBook, PriceBookBuilder};
use crate::reader::PdfReader;
use crate::serialize::{to_json, write_output};

/// A finished price book and how it was derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub pricebook: PriceBook,
    pub summary: ExtractSummary,
}

/// Build a price book from already reconstructed text lines.
///
/// Unlike the document-level entry points this accepts a result with no
/// rows; deciding whether that is an error is up to the caller.
pub fn parse_lines<'a, I>(lines: I, policy: ConflictPolicy) -> Result<Extraction>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut builder = PriceBookBuilder::new(policy);
    for line in lines {
        builder.add_line(line)?;
    }
    let (pricebook, summary) = builder.finish();
    Ok(Extraction { pricebook, summary })
}

/// Build a price book from extracted document text. Fails with
/// [`PricebookError::NoRecords`] when no line is a row.
pub fn extract_from_text(text: &ExtractedText, policy: ConflictPolicy) -> Result<Extraction> {
    let mut extraction = parse_lines(text.lines(), policy)?;
    extraction.summary.pages = text.pages.len();
    let summary = &extraction.summary;
    tracing::debug!(
        pages = summary.pages,
        lines = summary.lines,
        matched = summary.matched,
        noise = summary.noise,
        ambiguous = summary.ambiguous,
        duplicates = summary.duplicates,
        conflicts = summary.conflicts.len(),
        "parsed price book lines"
    );
    if extraction.pricebook.is_empty() {
        return Err(PricebookError::NoRecords);
    }
    Ok(extraction)
}

/// Parse PDF bytes and build the price book.
pub fn extract_from_bytes(data: Vec<u8>, policy: ConflictPolicy) -> Result<Extraction> {
    let reader = PdfReader::from_bytes(data)?;
    let text = extract_text(&reader)?;
    extract_from_text(&text, policy)
}

/// Read the PDF at `path` and return its reconstructed text.
pub fn read_text(path: &Path) -> Result<ExtractedText> {
    let reader = PdfReader::open(path)?;
    extract_text(&reader)
}

/// Run one complete conversion as configured.
///
/// The JSON document is rendered in memory before the destination is
/// touched, so a failed run never leaves an empty or partial file behind.
pub fn run(config: &ExtractConfig) -> Result<Extraction> {
    let text = read_text(&config.pdf)?;
    let extraction = extract_from_text(&text, config.conflicts)?;
    let json = to_json(&extraction.pricebook, config.style)?;
    write_output(&json, &config.output).map_err(|source| PricebookError::WriteOutput {
        target: config.output.to_string(),
        source,
    })?;
    Ok(extraction)
}

/// Reconstructed lines as plain text, pages separated by a form feed.
pub fn render_lines(text: &ExtractedText) -> String {
    let mut out = String::new();
    for (index, page) in text.pages.iter().enumerate() {
        if index > 0 {
            out.push_str("\x0C\n");
        }
        for line in page {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}
