//! PAK archive entries.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A Windows `FILETIME` value: 100-nanosecond ticks since 1601-01-01 UTC.
///
/// The archive stores it verbatim; it is only ever converted when it is
/// written back as a file's modification time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileTime(u64);

impl FileTime {
    const TICKS_PER_SECOND: u64 = 10_000_000;
    const NANOS_PER_TICK: u64 = 100;
    /// Ticks between 1601-01-01 and 1970-01-01.
    const UNIX_EPOCH_TICKS: u64 = 116_444_736_000_000_000;

    /// Wrap a raw `FILETIME` value.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw `FILETIME` value.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Convert to a SystemTime.
    ///
    /// Returns None if the value is not representable on this platform.
    pub fn to_system_time(self) -> Option<SystemTime> {
        if self.0 >= Self::UNIX_EPOCH_TICKS {
            UNIX_EPOCH.checked_add(Self::ticks_to_duration(self.0 - Self::UNIX_EPOCH_TICKS))
        } else {
            UNIX_EPOCH.checked_sub(Self::ticks_to_duration(Self::UNIX_EPOCH_TICKS - self.0))
        }
    }

    /// Convert from a SystemTime, truncating to 100ns precision.
    ///
    /// Returns None for times before 1601 or beyond the `u64` tick range.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        let ticks = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self::UNIX_EPOCH_TICKS.checked_add(Self::duration_to_ticks(after)?)?,
            Err(before) => Self::UNIX_EPOCH_TICKS.checked_sub(Self::duration_to_ticks(before.duration())?)?,
        };
        Some(Self(ticks))
    }

    fn ticks_to_duration(ticks: u64) -> Duration {
        let secs = ticks / Self::TICKS_PER_SECOND;
        let nanos = (ticks % Self::TICKS_PER_SECOND) * Self::NANOS_PER_TICK;
        Duration::new(secs, nanos as u32)
    }

    fn duration_to_ticks(duration: Duration) -> Option<u64> {
        let ticks = duration.as_nanos() / Self::NANOS_PER_TICK as u128;
        u64::try_from(ticks).ok()
    }
}

/// An entry (file) within a PAK archive.
///
/// This contains metadata about the file, not the file data itself. The name
/// is borrowed from the [`BlockArena`](popcap_common::BlockArena) the archive
/// header was parsed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PakEntry<'a> {
    /// File name/path within the archive (arena-allocated)
    pub name: &'a str,
    /// Size of the payload in bytes
    pub size: u32,
    /// Last write time
    pub last_write_time: FileTime,
    /// Offset of the payload relative to the start of the payload section
    pub offset: u64,
}

impl PakEntry<'_> {
    /// Get the last modification time as a SystemTime.
    #[inline]
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_write_time.to_system_time()
    }

    /// Get the relative output path for extraction.
    ///
    /// Converts Windows path separators to forward slashes.
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(self.name.replace('\\', "/"))
    }

    /// End of the payload relative to the start of the payload section.
    #[inline]
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size as u64
    }
}

/// Ordered list of archive entries.
///
/// Order is archive order, which is also the order the payloads follow each
/// other in the archive stream.
#[derive(Debug, Clone, Default)]
pub struct EntryList<'a> {
    entries: Vec<PakEntry<'a>>,
    payload_size: u64,
}

impl<'a> EntryList<'a> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; its payload follows the previous entry's payload.
    pub fn push(&mut self, name: &'a str, size: u32, last_write_time: FileTime) -> &PakEntry<'a> {
        let entry = PakEntry {
            name,
            size,
            last_write_time,
            offset: self.payload_size,
        };

        self.payload_size += size as u64;
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Get the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the list is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get entry by index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&PakEntry<'a>> {
        self.entries.get(index)
    }

    /// Iterate over entries in archive order.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, PakEntry<'a>> {
        self.entries.iter()
    }

    /// All entries as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[PakEntry<'a>] {
        &self.entries
    }

    /// Combined payload size of all entries.
    #[inline]
    pub fn payload_size(&self) -> u64 {
        self.payload_size
    }
}

impl<'l, 'a> IntoIterator for &'l EntryList<'a> {
    type Item = &'l PakEntry<'a>;
    type IntoIter = std::slice::Iter<'l, PakEntry<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
