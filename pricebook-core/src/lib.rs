pub mod config;
pub mod content;
pub mod error;
pub mod extract;
pub mod filters;
pub mod lexer;
pub mod objects;
pub mod parser;
pub mod price;
pub mod pricebook;
pub mod reader;
pub mod serialize;

pub use config::{ConflictPolicy, ExtractConfig};
pub use content::{extract_text, ExtractedText};
pub use error::{PdfReadError, PricebookError};
pub use extract::{extract_from_bytes, parse_lines, read_text, render_lines, run, Extraction};
pub use parser::{classify_line, LineClass, UnmatchedReason};
pub use price::Price;
pub use pricebook::{ExtractSummary, PriceBook, PriceBookEntry, PriceConflict};
pub use reader::PdfReader;
pub use serialize::{to_json, JsonStyle, OutputTarget};
