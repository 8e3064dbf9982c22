//! Error types for popcap-common.

use thiserror::Error;

/// Common error type for PopCap archive operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of stream reached while reading.
    #[error("unexpected end of stream: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check whether this error means the stream ran out of bytes.
    pub fn is_eof(&self) -> bool {
        match self {
            Error::UnexpectedEof { .. } => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_eof() {
        assert!(Error::UnexpectedEof { needed: 4, available: 1 }.is_eof());
        assert!(Error::from(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)).is_eof());
        assert!(!Error::from(std::io::Error::from(std::io::ErrorKind::PermissionDenied)).is_eof());
    }
}
