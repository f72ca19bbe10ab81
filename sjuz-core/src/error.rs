//! Error types for sjuz operations.
//!
//! The decoder distinguishes fatal conditions (truncated input, corrupt
//! metadata, unsupported coders) from the one recoverable condition: a
//! substream checksum mismatch, which flags the affected file instead of
//! failing the whole decode.

use std::io;
use thiserror::Error;

/// The main error type for sjuz operations.
#[derive(Debug, Error)]
pub enum SjuzError {
    /// I/O error from an underlying reader.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Input ended before a required read could complete.
    #[error("Truncated input: expected {expected} more bytes")]
    Truncated {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// Signature, version, stored checksum, or structural violation in the
    /// archive header/metadata.
    #[error("Corrupt header: {message}")]
    HeaderCorrupt {
        /// Description of the violation.
        message: String,
    },

    /// Metadata sections disagree about the shape of the archive (e.g. name
    /// table vs. size table entry counts).
    #[error("Inconsistent archive model: {message}")]
    ModelInconsistent {
        /// Description of the disagreement.
        message: String,
    },

    /// A folder declares a compression method this decoder does not
    /// implement.
    #[error("Unsupported codec: {method}")]
    UnsupportedCodec {
        /// Hex rendering of the method identifier bytes.
        method: String,
    },

    /// A folder's decompressed output did not match its declared size.
    #[error("Size mismatch: declared {expected} bytes, produced {actual}")]
    SizeMismatch {
        /// Size declared in the metadata.
        expected: u64,
        /// Size actually produced by the coder chain.
        actual: u64,
    },

    /// A stored CRC-32 did not match the computed value.
    #[error("Checksum mismatch: stored {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// CRC value stored in the archive.
        expected: u32,
        /// CRC value computed from the data.
        computed: u32,
    },

    /// An LZMA back-reference pointed outside the produced window.
    #[error("Invalid back-reference distance {distance} at output position {position}")]
    InvalidDistance {
        /// The offending distance.
        distance: u64,
        /// Output position where it was decoded.
        position: u64,
    },
}

/// Result type alias for sjuz operations.
pub type Result<T> = std::result::Result<T, SjuzError>;

impl SjuzError {
    /// Create a truncated-input error.
    pub fn truncated(expected: usize) -> Self {
        Self::Truncated { expected }
    }

    /// Create a corrupt-header error.
    pub fn header_corrupt(message: impl Into<String>) -> Self {
        Self::HeaderCorrupt {
            message: message.into(),
        }
    }

    /// Create a model-inconsistency error.
    pub fn model_inconsistent(message: impl Into<String>) -> Self {
        Self::ModelInconsistent {
            message: message.into(),
        }
    }

    /// Create an unsupported-codec error from raw method identifier bytes.
    pub fn unsupported_codec(method_id: &[u8]) -> Self {
        let method = method_id
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ");
        Self::UnsupportedCodec { method }
    }

    /// Create a size-mismatch error.
    pub fn size_mismatch(expected: u64, actual: u64) -> Self {
        Self::SizeMismatch { expected, actual }
    }

    /// Create a checksum-mismatch error.
    pub fn checksum_mismatch(expected: u32, computed: u32) -> Self {
        Self::ChecksumMismatch { expected, computed }
    }

    /// Create an invalid-distance error.
    pub fn invalid_distance(distance: u64, position: u64) -> Self {
        Self::InvalidDistance { distance, position }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SjuzError::truncated(12);
        assert!(err.to_string().contains("12 more bytes"));

        let err = SjuzError::checksum_mismatch(0x12345678, 0xDEADBEEF);
        assert!(err.to_string().contains("0x12345678"));

        let err = SjuzError::unsupported_codec(&[0x06, 0xF1, 0x07, 0x01]);
        assert!(err.to_string().contains("06 f1 07 01"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let err: SjuzError = io_err.into();
        assert!(matches!(err, SjuzError::Io(_)));
    }
}
