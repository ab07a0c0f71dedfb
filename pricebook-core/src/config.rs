use std::path::{Path, PathBuf};

use crate::serialize::{JsonStyle, OutputTarget};

/// What to do when a part code appears again with a different price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Keep the first occurrence and report the conflict in the summary.
    #[default]
    FirstWins,
    /// Abort the run on the first conflict.
    Strict,
}

/// Settings for one extraction run, resolved once up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractConfig {
    pub pdf: PathBuf,
    pub output: OutputTarget,
    pub style: JsonStyle,
    pub conflicts: ConflictPolicy,
}

impl ExtractConfig {
    /// Pretty JSON to standard output, first-wins duplicates.
    pub fn new(pdf: impl Into<PathBuf>) -> Self {
        ExtractConfig {
            pdf: pdf.into(),
            output: OutputTarget::Stdout,
            style: JsonStyle::Pretty,
            conflicts: ConflictPolicy::FirstWins,
        }
    }

    pub fn with_output(mut self, output: OutputTarget) -> Self {
        self.output = output;
        self
    }

    pub fn with_style(mut self, style: JsonStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_conflicts(mut self, conflicts: ConflictPolicy) -> Self {
        self.conflicts = conflicts;
        self
    }
}

/// `true` for file names following the bundled document's naming,
/// `Manual*Pricebook*.pdf`, ignoring case.
pub fn is_pricebook_file_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    let Some(stem) = lower.strip_suffix(".pdf") else {
        return false;
    };
    stem.strip_prefix("manual")
        .is_some_and(|rest| rest.contains("pricebook"))
}

/// First price book PDF, in sorted file-name order, of the first directory
/// in `dirs` that has one.
pub fn find_default_pdf(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter().find_map(|dir| find_in_dir(dir))
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| is_pricebook_file_name(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    candidates.sort();
    tracing::debug!(dir = %dir.display(), found = candidates.len(), "searched for price book PDF");
    candidates.into_iter().next()
}

/// Where the bundled document is looked for: the working directory, then
/// the directory holding the executable.
pub fn default_search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        if !dirs.contains(&exe_dir) {
            dirs.push(exe_dir);
        }
    }
    dirs
}
