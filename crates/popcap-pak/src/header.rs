//! PAK header and entry table parsing.
//!
//! Layout (every byte XORed with [`PAK_XOR_KEY`](popcap_common::cipher::PAK_XOR_KEY)):
//!
//! ```text
//! Header
//!   4 bytes - Magic (C0 4A C0 BA)
//!   4 bytes - Version (00 00 00 00)
//!   loop
//!     1 byte  - Record flag (0x80 ends the table)
//!     1 byte  - File name length (N)
//!     N bytes - File name
//!     4 bytes - File size (u32 LE)
//!     8 bytes - Last write time (FILETIME, u64 LE)
//!   end
//!
//! Body
//!   for each record
//!     record.size bytes - File data
//!   end
//! ```

use std::io::Read;

use popcap_common::{BlockArena, DecodingReader};
use tracing::{debug, warn};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::entry::{EntryList, FileTime};
use crate::{Error, Result};

/// Expected (decoded) PAK magic bytes.
pub const PAK_MAGIC: [u8; 4] = [0xC0, 0x4A, 0xC0, 0xBA];

/// Decoded record flag marking the end of the entry table.
pub const ENTRIES_END: u8 = 0x80;

/// Fixed-size header preceding the entry table.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
struct RawHeader {
    magic: [u8; 4],
    version: [u8; 4],
}

/// How strictly the header is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Validation {
    /// Reject a wrong magic, and an archive that ends before the entry table
    /// is terminated.
    #[default]
    Strict,
    /// Accept any magic; stop quietly at end of stream and keep the entries
    /// read so far.
    Permissive,
}

/// A parsed PAK header.
#[derive(Debug, Clone)]
pub struct PakHeader<'a> {
    /// Decoded magic bytes
    pub magic: [u8; 4],
    /// Decoded version bytes (never validated)
    pub version: [u8; 4],
    /// Entries in archive order
    pub entries: EntryList<'a>,
    /// Absolute archive offset at which the payload section starts
    pub payload_offset: u64,
    /// Whether the entry table was terminated by the end flag
    pub complete: bool,
}

impl<'a> PakHeader<'a> {
    /// Parse the header and entry table from the start of an archive stream.
    ///
    /// Entry names are allocated in `arena`. On success the reader is left
    /// positioned at the first payload byte.
    pub fn parse<R: Read>(
        reader: &mut DecodingReader<R>,
        arena: &'a BlockArena,
        validation: Validation,
    ) -> Result<Self> {
        let raw: RawHeader = reader.read_struct().map_err(|e| {
            if e.is_eof() {
                Error::Truncated { entries_read: 0 }
            } else {
                e.into()
            }
        })?;

        if raw.magic != PAK_MAGIC {
            match validation {
                Validation::Strict => {
                    return Err(Error::InvalidMagic {
                        expected: PAK_MAGIC,
                        actual: raw.magic,
                    })
                }
                Validation::Permissive => {
                    warn!(magic = ?raw.magic, "unexpected PAK magic, continuing")
                }
            }
        }

        if raw.version != [0; 4] {
            debug!(version = ?raw.version, "non-zero PAK version");
        }

        let mut entries = EntryList::new();
        let complete = Self::parse_entries(reader, arena, validation, &mut entries)?;

        debug!(
            entries = entries.len(),
            payload_size = entries.payload_size(),
            "parsed PAK entry table"
        );

        Ok(Self {
            magic: raw.magic,
            version: raw.version,
            entries,
            payload_offset: reader.position(),
            complete,
        })
    }

    /// Check whether the magic matches [`PAK_MAGIC`].
    #[inline]
    pub fn has_valid_magic(&self) -> bool {
        self.magic == PAK_MAGIC
    }

    /// Returns true if the table ended with the end flag.
    fn parse_entries<R: Read>(
        reader: &mut DecodingReader<R>,
        arena: &'a BlockArena,
        validation: Validation,
        entries: &mut EntryList<'a>,
    ) -> Result<bool> {
        loop {
            let Some(flag) = reader.try_read_u8()? else {
                return Self::truncated(validation, entries);
            };

            if flag == ENTRIES_END {
                return Ok(true);
            }

            if flag != 0 {
                debug!(flag, "unusual record flag");
            }

            match Self::parse_entry(reader, arena, entries) {
                Ok(()) => {}
                Err(e) if e.is_eof() => return Self::truncated(validation, entries),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn truncated(validation: Validation, entries: &EntryList<'a>) -> Result<bool> {
        match validation {
            Validation::Strict => Err(Error::Truncated {
                entries_read: entries.len(),
            }),
            Validation::Permissive => {
                warn!(
                    entries = entries.len(),
                    "archive ended before the entry table was terminated"
                );
                Ok(false)
            }
        }
    }

    fn parse_entry<R: Read>(
        reader: &mut DecodingReader<R>,
        arena: &'a BlockArena,
        entries: &mut EntryList<'a>,
    ) -> popcap_common::Result<()> {
        let name_len = reader.read_u8()? as usize;
        let name = Self::read_name(reader, arena, name_len)?;
        let size = reader.read_u32_le()?;
        let last_write_time = FileTime::from_raw(reader.read_u64_le()?);

        let entry = entries.push(name, size, last_write_time);
        debug!(name = entry.name, size = entry.size, "parsed entry");
        Ok(())
    }

    /// Read a name directly into the arena.
    ///
    /// Names end at the first NUL byte; invalid UTF-8 is replaced lossily.
    fn read_name<R: Read>(
        reader: &mut DecodingReader<R>,
        arena: &'a BlockArena,
        len: usize,
    ) -> popcap_common::Result<&'a str> {
        let buf = arena.alloc_zeroed(len);
        reader.read_into(buf)?;

        let buf: &'a [u8] = buf;
        let bytes = match memchr::memchr(0, buf) {
            Some(nul) => &buf[..nul],
            None => buf,
        };

        Ok(match std::str::from_utf8(bytes) {
            Ok(name) => name,
            Err(_) => arena.alloc_str(&String::from_utf8_lossy(bytes)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PakBuilder;

    fn parse(data: &[u8], validation: Validation) -> (BlockArena, Result<usize>) {
        let arena = BlockArena::new();
        let result = {
            let mut reader = DecodingReader::new(data);
            PakHeader::parse(&mut reader, &arena, validation).map(|h| h.entries.len())
        };
        (arena, result)
    }

    #[test]
    fn test_parse_entries() {
        let data = PakBuilder::new()
            .file("a.txt", b"hello", 11)
            .file("dir\\b.bin", b"", 22)
            .build();

        let arena = BlockArena::new();
        let mut reader = DecodingReader::new(&data[..]);
        let header = PakHeader::parse(&mut reader, &arena, Validation::Strict).unwrap();

        assert!(header.has_valid_magic());
        assert!(header.complete);
        assert_eq!(header.version, [0; 4]);
        assert_eq!(header.entries.len(), 2);

        let a = header.entries.get(0).unwrap();
        assert_eq!(a.name, "a.txt");
        assert_eq!(a.size, 5);
        assert_eq!(a.last_write_time.raw(), 11);

        let b = header.entries.get(1).unwrap();
        assert_eq!(b.name, "dir\\b.bin");
        assert_eq!(b.size, 0);
        assert_eq!(b.last_write_time.raw(), 22);

        // magic + version + 2 * (flag + len + name + size + time) + end flag
        let expected_offset = 8 + (1 + 1 + 5 + 4 + 8) + (1 + 1 + 9 + 4 + 8) + 1;
        assert_eq!(header.payload_offset, expected_offset);
        assert_eq!(reader.position(), expected_offset);
        assert_eq!(data.len() as u64, expected_offset + 5);
    }

    #[test]
    fn test_empty_archive() {
        let data = PakBuilder::new().build();
        let (_arena, count) = parse(&data, Validation::Strict);
        assert_eq!(count.unwrap(), 0);
    }

    #[test]
    fn test_empty_name() {
        let data = PakBuilder::new().file("", b"x", 0).build();

        let arena = BlockArena::new();
        let mut reader = DecodingReader::new(&data[..]);
        let header = PakHeader::parse(&mut reader, &arena, Validation::Strict).unwrap();

        assert_eq!(header.entries.len(), 1);
        assert_eq!(header.entries.get(0).unwrap().name, "");
    }

    #[test]
    fn test_name_cut_at_nul() {
        let data = PakBuilder::new().file_raw(b"abc\0def", b"", 0).build();

        let arena = BlockArena::new();
        let mut reader = DecodingReader::new(&data[..]);
        let header = PakHeader::parse(&mut reader, &arena, Validation::Strict).unwrap();

        assert_eq!(header.entries.get(0).unwrap().name, "abc");
    }

    #[test]
    fn test_non_utf8_name_is_lossy() {
        let data = PakBuilder::new().file_raw(b"caf\xE9.txt", b"", 0).build();

        let arena = BlockArena::new();
        let mut reader = DecodingReader::new(&data[..]);
        let header = PakHeader::parse(&mut reader, &arena, Validation::Strict).unwrap();

        assert_eq!(header.entries.get(0).unwrap().name, "caf\u{FFFD}.txt");
    }

    #[test]
    fn test_bad_magic() {
        let data = PakBuilder::new()
            .magic([0xDE, 0xAD, 0xBE, 0xEF])
            .file("a", b"1", 0)
            .build();

        let (_arena, strict) = parse(&data, Validation::Strict);
        assert!(matches!(strict, Err(Error::InvalidMagic { actual: [0xDE, 0xAD, 0xBE, 0xEF], .. })));

        let (_arena, permissive) = parse(&data, Validation::Permissive);
        assert_eq!(permissive.unwrap(), 1);
    }

    #[test]
    fn test_version_is_not_validated() {
        let data = PakBuilder::new().version([1, 2, 3, 4]).build();
        let (_arena, count) = parse(&data, Validation::Strict);
        assert_eq!(count.unwrap(), 0);
    }

    #[test]
    fn test_missing_end_flag() {
        let data = PakBuilder::new()
            .file("a", b"", 0)
            .file("b", b"", 0)
            .without_end_flag()
            .build();

        let (_arena, strict) = parse(&data, Validation::Strict);
        assert!(matches!(strict, Err(Error::Truncated { entries_read: 2 })));

        let arena = BlockArena::new();
        let mut reader = DecodingReader::new(&data[..]);
        let header = PakHeader::parse(&mut reader, &arena, Validation::Permissive).unwrap();
        assert_eq!(header.entries.len(), 2);
        assert!(!header.complete);
    }

    #[test]
    fn test_truncated_mid_entry() {
        let data = PakBuilder::new().file("abcdef", b"", 0).file("second", b"", 0).build();
        // Cut inside the second entry's name.
        let cut = 8 + (1 + 1 + 6 + 4 + 8) + 1 + 1 + 3;
        let data = &data[..cut];

        let (_arena, strict) = parse(data, Validation::Strict);
        assert!(matches!(strict, Err(Error::Truncated { entries_read: 1 })));

        let (_arena, permissive) = parse(data, Validation::Permissive);
        assert_eq!(permissive.unwrap(), 1);
    }

    #[test]
    fn test_short_header() {
        let data = PakBuilder::new().build();
        let (_arena, result) = parse(&data[..5], Validation::Permissive);
        assert!(matches!(result, Err(Error::Truncated { entries_read: 0 })));
    }
}
