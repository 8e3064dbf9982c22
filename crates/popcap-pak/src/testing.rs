//! Archive builder for unit tests.

use std::io::Write;

use popcap_common::EncodingWriter;

use crate::header::{ENTRIES_END, PAK_MAGIC};

struct PendingFile {
    name: Vec<u8>,
    data: Vec<u8>,
    declared_size: u32,
    time: u64,
}

/// Builds encoded PAK archives in memory.
pub struct PakBuilder {
    magic: [u8; 4],
    version: [u8; 4],
    files: Vec<PendingFile>,
    end_flag: bool,
}

impl PakBuilder {
    pub fn new() -> Self {
        Self {
            magic: PAK_MAGIC,
            version: [0; 4],
            files: Vec::new(),
            end_flag: true,
        }
    }

    pub fn magic(mut self, magic: [u8; 4]) -> Self {
        self.magic = magic;
        self
    }

    pub fn version(mut self, version: [u8; 4]) -> Self {
        self.version = version;
        self
    }

    pub fn file(self, name: &str, data: &[u8], time: u64) -> Self {
        self.file_raw(name.as_bytes(), data, time)
    }

    pub fn file_raw(self, name: &[u8], data: &[u8], time: u64) -> Self {
        self.file_sized(name, data, data.len() as u32, time)
    }

    /// Declare a size that may differ from the payload actually stored.
    pub fn file_sized(mut self, name: &[u8], data: &[u8], declared_size: u32, time: u64) -> Self {
        self.files.push(PendingFile {
            name: name.to_vec(),
            data: data.to_vec(),
            declared_size,
            time,
        });
        self
    }

    pub fn without_end_flag(mut self) -> Self {
        self.end_flag = false;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = EncodingWriter::new(Vec::new());

        out.write_all(&self.magic).unwrap();
        out.write_all(&self.version).unwrap();

        for file in &self.files {
            out.write_all(&[0x00, file.name.len() as u8]).unwrap();
            out.write_all(&file.name).unwrap();
            out.write_all(&file.declared_size.to_le_bytes()).unwrap();
            out.write_all(&file.time.to_le_bytes()).unwrap();
        }

        if self.end_flag {
            out.write_all(&[ENTRIES_END]).unwrap();

            for file in &self.files {
                out.write_all(&file.data).unwrap();
            }
        }

        out.into_inner()
    }
}
