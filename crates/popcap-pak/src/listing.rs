//! Sidecar file listing.

use std::io::{self, Write};

use crate::entry::EntryList;

/// Default location of the listing, relative to the working directory.
pub const DEFAULT_LISTING_PATH: &str = "filenames.txt";

/// Write one `"<name>, <size>"` line per entry, in archive order.
pub fn write_listing<W: Write>(entries: &EntryList<'_>, mut out: W) -> io::Result<()> {
    for entry in entries {
        writeln!(out, "{}, {}", entry.name, entry.size)?;
    }

    out.flush()
}
