//! Common utilities for PopCap archive tooling.
//!
//! This crate provides the building blocks shared by the `.pak` reader:
//!
//! - [`BlockArena`] - Block-chained bump arena for per-run metadata
//! - [`cipher`] - The fixed-key XOR byte cipher applied to every archive byte
//! - [`DecodingReader`] - A `Read` adapter that decodes bytes as they are read
//! - [`EncodingWriter`] - The mirror adapter, encoding bytes as they are written

mod arena;
mod error;
mod reader;

pub mod cipher;

pub use arena::{BlockArena, DEFAULT_BLOCK_SIZE};
pub use error::{Error, Result};
pub use reader::{DecodingReader, EncodingWriter};
