//! Popcap - PopCap game archive extraction library.
//!
//! This crate provides a unified interface to the library crates for working
//! with PopCap game archives.
//!
//! # Crates
//!
//! - [`popcap_common`] - Common utilities (block arena, XOR cipher, decoding reader)
//! - [`popcap_pak`] - `.pak` archive parsing and extraction
//!
//! # Example
//!
//! ```no_run
//! use popcap::prelude::*;
//!
//! let summary = run(&RunConfig::new("main.pak", "extracted"))?;
//! println!("Extracted {} of {} entries", summary.report.extracted, summary.entry_count);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use popcap_common as common;
pub use popcap_pak as pak;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use popcap_common::{BlockArena, DecodingReader};
    pub use popcap_pak::{
        run, run_with, ExtractReport, Extractor, PakEntry, PakHeader, RunConfig, RunObserver,
        RunSummary, Validation,
    };
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
