//! Extraction of PAK payloads to the filesystem.
//!
//! Payloads follow each other in the archive in entry-table order, so the
//! sequential [`Extractor::extract`] walks the entry list and the archive
//! stream in lockstep, never seeking. With the `parallel` feature the archive
//! can instead be memory-mapped and every entry's payload sliced out up front,
//! which lets entries be written concurrently.
//!
//! A failing entry never aborts the run: it is logged, recorded in the
//! [`ExtractReport`] and extraction moves on to the next entry.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use popcap_common::DecodingReader;
use thiserror::Error;
use tracing::{debug, error};

use crate::entry::{EntryList, PakEntry};

/// Size of the chunks payloads are streamed in.
pub const BUFFER_SIZE: usize = 8192;

/// The step of extracting an entry that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// The entry name is empty or would escape the output directory.
    InvalidPath,
    /// A parent directory could not be created.
    CreateDir,
    /// The destination file could not be created (usually: it already exists).
    CreateFile,
    /// The archive ended inside the entry's payload.
    Read,
    /// Writing the destination file failed.
    Write,
    /// The modification time could not be set.
    SetTime,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureStage::InvalidPath => "path check",
            FailureStage::CreateDir => "directory creation",
            FailureStage::CreateFile => "file creation",
            FailureStage::Read => "payload read",
            FailureStage::Write => "write",
            FailureStage::SetTime => "timestamp update",
        })
    }
}

/// A single entry that could not be extracted.
#[derive(Debug, Error)]
#[error("{stage} failed for `{}`: {source}", .path.display())]
pub struct EntryFailure {
    /// Entry name as stored in the archive
    pub name: String,
    /// Destination path
    pub path: PathBuf,
    /// Step that failed
    pub stage: FailureStage,
    /// Underlying error
    #[source]
    pub source: io::Error,
}

impl EntryFailure {
    fn new(entry: &PakEntry<'_>, path: &Path, stage: FailureStage, source: io::Error) -> Self {
        Self {
            name: entry.name.to_string(),
            path: path.to_path_buf(),
            stage,
            source,
        }
    }
}

/// Outcome of an extraction run.
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Number of entries written successfully
    pub extracted: usize,
    /// Entries that failed, in the order they were attempted
    pub failures: Vec<EntryFailure>,
}

impl ExtractReport {
    /// Returns true if every entry was extracted.
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of entries attempted.
    #[inline]
    pub fn total(&self) -> usize {
        self.extracted + self.failures.len()
    }

    fn record(&mut self, result: Result<PathBuf, EntryFailure>) {
        match result {
            Ok(path) => {
                debug!(path = %path.display(), "extracted");
                self.extracted += 1;
            }
            Err(failure) => {
                error!(entry = %failure.name, stage = %failure.stage, "{failure}");
                self.failures.push(failure);
            }
        }
    }
}

/// Writes archive entries below an output root.
#[derive(Debug)]
pub struct Extractor {
    root: PathBuf,
    buffer: Vec<u8>,
}

impl Extractor {
    /// Create an extractor writing below `root`.
    ///
    /// `root` and any missing parents are created on demand.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            buffer: vec![0u8; BUFFER_SIZE],
        }
    }

    /// Get the output root.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extract every entry, reading payloads sequentially from `reader`.
    ///
    /// `reader` must be positioned at the start of the payload section, as
    /// left by [`PakHeader::parse`](crate::PakHeader::parse).
    pub fn extract<R: Read>(
        &mut self,
        entries: &EntryList<'_>,
        reader: &mut DecodingReader<R>,
    ) -> ExtractReport {
        self.extract_with_progress(entries, reader, |_| {})
    }

    /// Like [`extract`](Self::extract), calling `progress` after each entry.
    pub fn extract_with_progress<R, F>(
        &mut self,
        entries: &EntryList<'_>,
        reader: &mut DecodingReader<R>,
        mut progress: F,
    ) -> ExtractReport
    where
        R: Read,
        F: FnMut(&PakEntry<'_>),
    {
        let mut report = ExtractReport::default();

        for entry in entries {
            let mut remaining = entry.size as u64;
            let result = self.extract_entry(entry, reader, &mut remaining);

            // An abandoned entry still owns its payload bytes; skip them so the
            // next entry starts at its own payload.
            if remaining > 0 {
                match reader.skip(remaining) {
                    Ok(skipped) if skipped < remaining => {
                        debug!(entry = entry.name, "archive ended inside skipped payload")
                    }
                    Ok(_) => {}
                    Err(e) => debug!(entry = entry.name, error = %e, "failed to skip payload"),
                }
            }

            report.record(result);
            progress(entry);
        }

        report
    }

    fn extract_entry<R: Read>(
        &mut self,
        entry: &PakEntry<'_>,
        reader: &mut DecodingReader<R>,
        remaining: &mut u64,
    ) -> Result<PathBuf, EntryFailure> {
        let (path, mut file) = create_destination(&self.root, entry)?;

        while *remaining > 0 {
            let want = (*remaining).min(BUFFER_SIZE as u64) as usize;
            let chunk = &mut self.buffer[..want];

            let read = match reader.read(chunk) {
                Ok(0) => {
                    return Err(EntryFailure::new(
                        entry,
                        &path,
                        FailureStage::Read,
                        payload_eof(),
                    ))
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(EntryFailure::new(entry, &path, FailureStage::Read, e)),
            };

            *remaining -= read as u64;
            file.write_all(&chunk[..read])
                .map_err(|e| EntryFailure::new(entry, &path, FailureStage::Write, e))?;
        }

        restore_time(&file, entry)
            .map_err(|e| EntryFailure::new(entry, &path, FailureStage::SetTime, e))?;

        Ok(path)
    }
}

#[cfg(feature = "parallel")]
impl Extractor {
    /// Extract every entry concurrently from a memory-mapped archive.
    ///
    /// `payload_offset` is the absolute offset of the payload section, as
    /// recorded in [`PakHeader::payload_offset`](crate::PakHeader::payload_offset).
    /// Entries sharing a destination path race for it; exactly one wins.
    pub fn extract_parallel<F>(
        &self,
        entries: &EntryList<'_>,
        archive: &File,
        payload_offset: u64,
        progress: F,
    ) -> crate::Result<ExtractReport>
    where
        F: FnMut(&PakEntry<'_>) + Send,
    {
        // SAFETY: the archive is only read, and is not modified while mapped.
        let mmap = unsafe { memmap2::Mmap::map(archive)? };
        let payload = usize::try_from(payload_offset)
            .ok()
            .and_then(|offset| mmap.get(offset..))
            .unwrap_or(&[]);

        Ok(self.extract_slices(entries, payload, progress))
    }

    /// Extract every entry concurrently from an in-memory payload section.
    pub fn extract_slices<F>(
        &self,
        entries: &EntryList<'_>,
        payload: &[u8],
        progress: F,
    ) -> ExtractReport
    where
        F: FnMut(&PakEntry<'_>) + Send,
    {
        use rayon::prelude::*;

        let progress = parking_lot::Mutex::new(progress);

        let results: Vec<_> = entries
            .as_slice()
            .par_iter()
            .map(|entry| {
                let result = self.extract_slice(entry, payload);
                let mut progress = progress.lock();
                (*progress)(entry);
                result
            })
            .collect();

        let mut report = ExtractReport::default();
        for result in results {
            report.record(result);
        }
        report
    }

    fn extract_slice(&self, entry: &PakEntry<'_>, payload: &[u8]) -> Result<PathBuf, EntryFailure> {
        let (path, mut file) = create_destination(&self.root, entry)?;

        let start = (entry.offset as usize).min(payload.len());
        let end = (entry.end_offset() as usize).min(payload.len());
        let available = &payload[start..end];

        let mut buffer = [0u8; BUFFER_SIZE];
        for chunk in available.chunks(BUFFER_SIZE) {
            let decoded = &mut buffer[..chunk.len()];
            decoded.copy_from_slice(chunk);
            popcap_common::cipher::decode_in_place(decoded);

            file.write_all(decoded)
                .map_err(|e| EntryFailure::new(entry, &path, FailureStage::Write, e))?;
        }

        if available.len() < entry.size as usize {
            return Err(EntryFailure::new(entry, &path, FailureStage::Read, payload_eof()));
        }

        restore_time(&file, entry)
            .map_err(|e| EntryFailure::new(entry, &path, FailureStage::SetTime, e))?;

        Ok(path)
    }
}

fn payload_eof() -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "archive ended inside entry payload",
    )
}

/// Resolve the destination, create its parents and create the file itself.
///
/// The file is opened with `create_new`: an existing file is never truncated.
fn create_destination(root: &Path, entry: &PakEntry<'_>) -> Result<(PathBuf, File), EntryFailure> {
    let path = resolve_path(root, entry.name).map_err(|e| {
        EntryFailure::new(entry, &root.join(entry.output_path()), FailureStage::InvalidPath, e)
    })?;

    create_parent_dirs(&path)
        .map_err(|e| EntryFailure::new(entry, &path, FailureStage::CreateDir, e))?;

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| EntryFailure::new(entry, &path, FailureStage::CreateFile, e))?;

    Ok((path, file))
}

/// Join an archive name onto the output root.
///
/// Both `\` and `/` separate components. Names that are empty or contain a
/// root, a drive prefix or `..` are rejected.
fn resolve_path(root: &Path, name: &str) -> io::Result<PathBuf> {
    let relative = name.replace('\\', "/");
    let mut path = root.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(&relative).components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("entry name `{name}` escapes the output directory"),
                ));
            }
        }
    }

    if depth == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "entry name is empty",
        ));
    }

    Ok(path)
}

/// Create every missing ancestor directory of `path`, outermost first.
///
/// Directories that already exist, or that appear concurrently, are fine.
fn create_parent_dirs(path: &Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };

    let missing: Vec<&Path> = parent
        .ancestors()
        .take_while(|dir| !dir.as_os_str().is_empty() && !dir.is_dir())
        .collect();

    for dir in missing.iter().rev() {
        match fs::create_dir(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

fn restore_time(file: &File, entry: &PakEntry<'_>) -> io::Result<()> {
    let time = entry.last_modified().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("timestamp {:#x} is out of range", entry.last_write_time.raw()),
        )
    })?;

    file.set_modified(time)
}
