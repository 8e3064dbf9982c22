//! PopCap `.pak` archive reader and extractor.
//!
//! A PAK archive is a flat table of file records followed by the file
//! payloads, concatenated in table order. Every byte of the archive is XORed
//! with a fixed key. There is no compression, no per-file offset and no
//! checksum: a payload's position is implied by the sizes of the entries
//! before it.
//!
//! Extraction is a single forward pass. The entry table is parsed into an
//! [`EntryList`] whose names live in a [`BlockArena`](popcap_common::BlockArena),
//! and the payloads are then streamed straight to disk in the same order.
//!
//! # Features
//!
//! - `parallel` - memory-mapped, concurrent extraction with rayon
//!
//! # Example
//!
//! ```no_run
//! use popcap_pak::{run, RunConfig};
//!
//! let config = RunConfig::new("main.pak", "extracted").with_listing("filenames.txt");
//! let summary = run(&config)?;
//!
//! println!("{} entries", summary.entry_count);
//! for failure in &summary.report.failures {
//!     eprintln!("{failure}");
//! }
//! # Ok::<(), popcap_pak::Error>(())
//! ```

mod entry;
mod error;
mod extract;
mod header;
mod listing;
mod run;

#[cfg(test)]
mod testing;

pub use entry::{EntryList, FileTime, PakEntry};
pub use error::{Error, Result};
pub use extract::{EntryFailure, ExtractReport, Extractor, FailureStage, BUFFER_SIZE};
pub use header::{PakHeader, Validation, ENTRIES_END, PAK_MAGIC};
pub use listing::{write_listing, DEFAULT_LISTING_PATH};
pub use run::{run, run_with, ArchiveReader, RunConfig, RunContext, RunObserver, RunSummary};
