use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use pricebook_core::config::{default_search_dirs, find_default_pdf};
use pricebook_core::serialize::write_output;
use pricebook_core::{
    read_text, render_lines, run, ConflictPolicy, ExtractConfig, JsonStyle, OutputTarget,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Convert a manual price book PDF into a JSON array of
/// `{part_code, description, price}` records.
#[derive(Parser, Debug)]
#[command(name = "pdf-to-pricebook", version)]
struct Args {
    /// Input PDF. Defaults to the first `Manual*Pricebook*.pdf` found in the
    /// search directories.
    #[arg(long, value_name = "PATH")]
    pdf: Option<PathBuf>,

    /// Directory searched for the default PDF instead of the working
    /// directory and the executable's directory.
    #[arg(long, value_name = "DIR", conflicts_with = "pdf")]
    search_dir: Option<PathBuf>,

    /// Write JSON to this file instead of standard output.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// Emit single-line JSON.
    #[arg(long)]
    compact: bool,

    /// Fail when a part code repeats with a different price.
    #[arg(long)]
    strict: bool,

    /// Print the reconstructed text lines instead of JSON.
    #[arg(long)]
    dump_lines: bool,

    /// Log per-stage details.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Log warnings and errors only.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    fn resolve_pdf(&self) -> Result<PathBuf> {
        if let Some(pdf) = &self.pdf {
            return Ok(pdf.clone());
        }
        let dirs = match &self.search_dir {
            Some(dir) => vec![dir.clone()],
            None => default_search_dirs(),
        };
        find_default_pdf(&dirs).ok_or_else(|| {
            let searched: Vec<String> = dirs.iter().map(|d| d.display().to_string()).collect();
            anyhow!(
                "no Manual*Pricebook*.pdf found in {}; pass --pdf",
                searched.join(", ")
            )
        })
    }

    fn into_config(self) -> Result<ExtractConfig> {
        let pdf = self.resolve_pdf()?;
        let output = match self.out {
            Some(path) => OutputTarget::File(path),
            None => OutputTarget::Stdout,
        };
        let style = if self.compact {
            JsonStyle::Compact
        } else {
            JsonStyle::Pretty
        };
        let conflicts = if self.strict {
            ConflictPolicy::Strict
        } else {
            ConflictPolicy::FirstWins
        };
        Ok(ExtractConfig::new(pdf)
            .with_output(output)
            .with_style(style)
            .with_conflicts(conflicts))
    }
}

fn setup_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn dump_lines(config: &ExtractConfig) -> Result<()> {
    let text = read_text(&config.pdf)
        .with_context(|| format!("failed to extract text from {}", config.pdf.display()))?;
    write_output(render_lines(&text).as_bytes(), &config.output)
        .with_context(|| format!("failed to write to {}", config.output))?;
    info!(
        pages = text.pages.len(),
        lines = text.line_count(),
        "dumped text lines to {}",
        config.output
    );
    Ok(())
}

fn convert(config: &ExtractConfig) -> Result<()> {
    let extraction = run(config)
        .with_context(|| format!("failed to convert {}", config.pdf.display()))?;
    let summary = &extraction.summary;
    if !summary.conflicts.is_empty() {
        warn!(
            conflicts = summary.conflicts.len(),
            "kept the first price of repeated part codes"
        );
    }
    info!(
        pages = summary.pages,
        dropped = summary.dropped(),
        duplicates = summary.duplicates,
        "wrote {} rows to {}",
        extraction.pricebook.len(),
        config.output
    );
    Ok(())
}

fn try_main(args: Args) -> Result<()> {
    let dump = args.dump_lines;
    let config = args.into_config()?;
    info!(pdf = %config.pdf.display(), "reading price book");
    if dump {
        dump_lines(&config)
    } else {
        convert(&config)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(args.log_level());

    match try_main(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
