//! One complete extraction run: open, parse, list, extract.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use popcap_common::{BlockArena, DecodingReader};
use tracing::{debug, info};

use crate::entry::PakEntry;
use crate::extract::{ExtractReport, Extractor};
use crate::header::{PakHeader, Validation};
use crate::listing::{write_listing, DEFAULT_LISTING_PATH};
use crate::{Error, Result};

/// Archive stream as read during a run.
pub type ArchiveReader = DecodingReader<BufReader<File>>;

/// Inputs of a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Archive to extract
    pub archive: PathBuf,
    /// Output root; must not exist yet
    pub output: PathBuf,
    /// Sidecar listing path
    pub listing: PathBuf,
    /// Header validation mode
    pub validation: Validation,
    /// Extract entries concurrently (requires the `parallel` feature)
    pub parallel: bool,
}

impl RunConfig {
    /// Create a config with the default listing path and strict validation.
    pub fn new(archive: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            output: output.into(),
            listing: PathBuf::from(DEFAULT_LISTING_PATH),
            validation: Validation::default(),
            parallel: false,
        }
    }

    /// Write the sidecar listing to `listing`.
    pub fn with_listing(mut self, listing: impl Into<PathBuf>) -> Self {
        self.listing = listing.into();
        self
    }

    /// Set how strictly the header is checked.
    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    /// Extract entries concurrently when `parallel` is true.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Resources held for the duration of a run.
///
/// Everything is released on drop, whichever way the run ends.
#[derive(Debug)]
pub struct RunContext {
    archive: ArchiveReader,
    listing: BufWriter<File>,
    arena: BlockArena,
}

impl RunContext {
    /// Open the archive for reading and create (truncate) the listing file.
    pub fn open(archive: &Path, listing: &Path) -> Result<Self> {
        let archive_file = File::open(archive).map_err(|source| Error::OpenArchive {
            path: archive.to_path_buf(),
            source,
        })?;

        let listing_file = File::create(listing).map_err(|source| Error::CreateListing {
            path: listing.to_path_buf(),
            source,
        })?;

        Ok(Self {
            archive: DecodingReader::new(BufReader::new(archive_file)),
            listing: BufWriter::new(listing_file),
            arena: BlockArena::new(),
        })
    }

    /// Borrow the archive stream, listing writer and arena at once.
    ///
    /// Entry names parsed into the arena stay borrowed while the stream keeps
    /// being read.
    pub fn split(&mut self) -> (&mut ArchiveReader, &mut BufWriter<File>, &BlockArena) {
        (&mut self.archive, &mut self.listing, &self.arena)
    }
}

/// Hooks invoked as a run progresses.
///
/// Every method does nothing by default.
pub trait RunObserver {
    /// The header and entry table were parsed.
    fn parsed(&mut self, _header: &PakHeader<'_>) {}

    /// The sidecar listing was written.
    fn listing_written(&mut self, _path: &Path) {}

    /// An entry was attempted, successfully or not.
    fn entry_done(&mut self, _entry: &PakEntry<'_>) {}

    /// Extraction finished.
    fn extracted(&mut self, _report: &ExtractReport) {}
}

impl RunObserver for () {}

/// Outcome of a run that got as far as extraction.
#[derive(Debug)]
pub struct RunSummary {
    /// Number of entries in the archive's table
    pub entry_count: usize,
    /// Whether the entry table was terminated by the end flag
    pub complete: bool,
    /// Where the listing was written
    pub listing: PathBuf,
    /// Output root
    pub output: PathBuf,
    /// Per-entry results
    pub report: ExtractReport,
}

/// Run an extraction without observing it.
pub fn run(config: &RunConfig) -> Result<RunSummary> {
    run_with(config, &mut ())
}

/// Run an extraction, reporting progress to `observer`.
///
/// Fails before touching the filesystem if the output root already exists.
/// If the archive can't be parsed or the listing can't be written, the
/// listing file is removed again. Once extraction starts, failing entries
/// only show up in the summary's report.
pub fn run_with<O>(config: &RunConfig, observer: &mut O) -> Result<RunSummary>
where
    O: RunObserver + Send,
{
    if config.output.exists() {
        return Err(Error::OutputExists(config.output.clone()));
    }

    let mut context = RunContext::open(&config.archive, &config.listing)?;
    let (reader, listing, arena) = context.split();

    let header = match PakHeader::parse(reader, arena, config.validation) {
        Ok(header) => header,
        Err(e) => {
            drop(context);
            discard_listing(&config.listing);
            return Err(e);
        }
    };
    info!(
        archive = %config.archive.display(),
        entries = header.entries.len(),
        "parsed archive"
    );
    observer.parsed(&header);

    if let Err(e) = write_listing(&header.entries, &mut *listing) {
        drop(header);
        drop(context);
        discard_listing(&config.listing);
        return Err(e.into());
    }
    debug!(path = %config.listing.display(), "wrote file listing");
    observer.listing_written(&config.listing);

    let report = extract(config, &header, reader, |entry| observer.entry_done(entry))?;
    info!(
        extracted = report.extracted,
        failed = report.failures.len(),
        output = %config.output.display(),
        "extraction finished"
    );
    observer.extracted(&report);

    Ok(RunSummary {
        entry_count: header.entries.len(),
        complete: header.complete,
        listing: config.listing.clone(),
        output: config.output.clone(),
        report,
    })
}

/// Remove a listing left behind by a run that failed during setup.
fn discard_listing(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        debug!(path = %path.display(), error = %e, "failed to remove file listing");
    }
}

#[cfg(feature = "parallel")]
fn extract<F>(
    config: &RunConfig,
    header: &PakHeader<'_>,
    reader: &mut ArchiveReader,
    progress: F,
) -> Result<ExtractReport>
where
    F: FnMut(&PakEntry<'_>) + Send,
{
    let mut extractor = Extractor::new(&config.output);

    if config.parallel {
        let archive = reader.get_ref().get_ref();
        extractor.extract_parallel(&header.entries, archive, header.payload_offset, progress)
    } else {
        Ok(extractor.extract_with_progress(&header.entries, reader, progress))
    }
}

#[cfg(not(feature = "parallel"))]
fn extract<F>(
    config: &RunConfig,
    header: &PakHeader<'_>,
    reader: &mut ArchiveReader,
    progress: F,
) -> Result<ExtractReport>
where
    F: FnMut(&PakEntry<'_>) + Send,
{
    if config.parallel {
        tracing::warn!("built without the `parallel` feature, extracting sequentially");
    }

    let mut extractor = Extractor::new(&config.output);
    Ok(extractor.extract_with_progress(&header.entries, reader, progress))
}
