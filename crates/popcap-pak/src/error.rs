//! Error types for the PAK crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a PAK parse or extraction run.
///
/// Failures of individual entries during extraction are not represented here;
/// they are collected as [`EntryFailure`](crate::EntryFailure)s instead.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] popcap_common::Error),

    /// Invalid PAK magic bytes.
    #[error("invalid PAK magic: expected {expected:02x?}, got {actual:02x?}")]
    InvalidMagic { expected: [u8; 4], actual: [u8; 4] },

    /// The archive ended before the entry table was terminated.
    #[error("archive truncated in entry table after {entries_read} entries")]
    Truncated { entries_read: usize },

    /// The archive could not be opened.
    #[error("can't open archive `{}`: {source}", .path.display())]
    OpenArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sidecar listing could not be created.
    #[error("can't create file listing `{}`: {source}", .path.display())]
    CreateListing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output directory already exists.
    #[error("output directory already exists: `{}`", .0.display())]
    OutputExists(PathBuf),
}

/// Result type for PAK operations.
pub type Result<T> = std::result::Result<T, Error>;
