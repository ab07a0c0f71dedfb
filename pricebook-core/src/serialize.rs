use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::pricebook::PriceBook;

/// JSON layout of the output document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JsonStyle {
    /// Two-space indentation, one field per line.
    #[default]
    Pretty,
    /// A single line without insignificant whitespace.
    Compact,
}

/// Where the output document goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputTarget {
    #[default]
    Stdout,
    File(PathBuf),
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Stdout => f.write_str("standard output"),
            OutputTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Render the price book as a JSON array terminated by a newline.
pub fn to_json(book: &PriceBook, style: JsonStyle) -> serde_json::Result<Vec<u8>> {
    let mut out = match style {
        JsonStyle::Pretty => serde_json::to_vec_pretty(book)?,
        JsonStyle::Compact => serde_json::to_vec(book)?,
    };
    out.push(b'\n');
    Ok(out)
}

/// Write a fully rendered document to `target` in one go.
pub fn write_output(bytes: &[u8], target: &OutputTarget) -> io::Result<()> {
    match target {
        OutputTarget::Stdout => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()
        }
        OutputTarget::File(path) => std::fs::write(path, bytes),
    }
}
