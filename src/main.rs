//! Popcap CLI - Command-line tool for extracting PopCap `.pak` archives.
//!
//! This is the main entry point for the Popcap command-line application.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use popcap::pak::DEFAULT_LISTING_PATH;
use popcap::prelude::*;

/// Popcap - PopCap .pak archive extraction tool
#[derive(Parser)]
#[command(name = "popcap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the .pak archive
    #[arg(env = "POPCAP_ARCHIVE")]
    archive: PathBuf,

    /// Output directory (must not exist)
    #[arg(env = "POPCAP_OUTPUT")]
    output: PathBuf,

    /// Where to save the file name list
    #[arg(short, long, env = "POPCAP_LISTING", default_value = DEFAULT_LISTING_PATH)]
    listing: PathBuf,

    /// Accept a wrong magic and a truncated entry table
    #[arg(long)]
    permissive: bool,

    /// Extract entries concurrently
    #[arg(short, long)]
    parallel: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

/// Prints run milestones and drives the progress bar.
struct Progress {
    bar: ProgressBar,
}

impl Progress {
    fn new(quiet: bool) -> Result<Self> {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {wide_msg}")?
                .progress_chars("#>-"),
        );

        Ok(Self { bar })
    }
}

impl RunObserver for Progress {
    fn parsed(&mut self, header: &PakHeader<'_>) {
        println!("[SUCCESS] archive has {} files", header.entries.len());
        self.bar.set_length(header.entries.len() as u64);
    }

    fn listing_written(&mut self, path: &Path) {
        println!("[SUCCESS] file name list is saved at `{}`", path.display());
    }

    fn entry_done(&mut self, entry: &PakEntry<'_>) {
        self.bar.set_message(entry.name.to_string());
        self.bar.inc(1);
    }

    fn extracted(&mut self, _report: &ExtractReport) {
        self.bar.finish_and_clear();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let validation = if cli.permissive {
        Validation::Permissive
    } else {
        Validation::Strict
    };

    let config = RunConfig::new(&cli.archive, &cli.output)
        .with_listing(&cli.listing)
        .with_validation(validation)
        .with_parallel(cli.parallel);

    let start = Instant::now();
    let mut progress = Progress::new(cli.quiet)?;
    let summary = run_with(&config, &mut progress)
        .with_context(|| format!("Failed to extract `{}`", cli.archive.display()))?;

    println!("[SUCCESS] files are saved at `{}`", summary.output.display());

    let report = &summary.report;
    if !report.is_clean() {
        println!(
            "{} of {} files could not be extracted",
            report.failures.len(),
            report.total()
        );
    }

    println!("Extraction completed in {:?}", start.elapsed());

    Ok(())
}
