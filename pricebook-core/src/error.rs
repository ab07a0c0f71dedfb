use std::path::PathBuf;

use thiserror::Error;

/// Structural problems found while reading a PDF file.
///
/// Every variant maps to [`PricebookError::MalformedDocument`] at the top
/// level; the variant only narrows down where parsing gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PdfReadError {
    /// The bytes do not start with a valid `%PDF-` header.
    #[error("not a PDF file")]
    NotAPdf,
    /// The `startxref` keyword or its offset could not be found.
    #[error("startxref not found")]
    StartxrefNotFound,
    /// The cross-reference table or stream is missing or could not be parsed.
    #[error("malformed or missing cross-reference data")]
    MalformedXref,
    /// The trailer dictionary is missing or has no `/Root`.
    #[error("malformed or missing trailer")]
    MalformedTrailer,
    /// An object reference could not be resolved (not in xref or offset out of range).
    #[error("cannot resolve object {0}")]
    UnresolvableObject(u32),
    /// An object was located but its body could not be parsed.
    #[error("object {0} is malformed")]
    MalformedObject(u32),
    /// The page tree structure is invalid (missing /Pages, /Kids or /Type).
    #[error("malformed page tree")]
    MalformedPageTree,
    /// A stream declares a filter this reader cannot decode.
    #[error("unsupported stream filter /{0}")]
    UnsupportedFilter(String),
    /// A stream could not be decoded with its declared filter.
    #[error("cannot decode stream: {0}")]
    Decompress(String),
}

/// Errors that abort a price book extraction run.
///
/// Messages describe only their own layer; the underlying cause is
/// available through [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum PricebookError {
    /// The input is not a parseable PDF.
    #[error("malformed document")]
    MalformedDocument(#[from] PdfReadError),
    /// The PDF parsed, but no page contains a text-showing operator.
    #[error("document contains no extractable text (is it a scanned or image-only PDF?)")]
    EmptyDocument,
    /// Text was extracted but not a single line looked like a price book row.
    #[error("no price book rows found; is this the expected price book PDF?")]
    NoRecords,
    /// A part code repeats with a different price and the strict policy is active.
    #[error("part code {part_code} listed at {first} and again at {other}")]
    ConflictingPrices {
        part_code: String,
        first: String,
        other: String,
    },
    #[error("cannot read {}", path.display())]
    ReadInput {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write to {target}")]
    WriteOutput {
        target: String,
        source: std::io::Error,
    },
    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PricebookError>;
