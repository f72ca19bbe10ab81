//! # sjuz Core
//!
//! Core components for the sjuz 7z decoder.
//!
//! This crate provides the building blocks shared by the codec and container
//! layers:
//!
//! - [`reader`]: bounded byte cursor with 7z number/bitmap primitives
//! - [`crc`]: CRC-32 checksums
//! - [`error`]: error types
//!
//! ## Architecture
//!
//! The workspace is a small layered stack:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ sjuz-archive: 7z container                  │
//! │     header/streams/files parsing, dispatch  │
//! ├─────────────────────────────────────────────┤
//! │ sjuz-lzma: codec                            │
//! │     LZMA / LZMA2, range coder               │
//! ├─────────────────────────────────────────────┤
//! │ sjuz-core (this crate)                      │
//! │     ByteReader, Crc32, SjuzError            │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use sjuz_core::crc::Crc32;
//! use sjuz_core::reader::ByteReader;
//!
//! let mut rd = ByteReader::new(&[0x81, 0xFF]);
//! assert_eq!(rd.read_number().unwrap(), 0x1FF);
//!
//! assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crc;
pub mod error;
pub mod reader;

// Re-exports for convenience
pub use crc::Crc32;
pub use error::{Result, SjuzError};
pub use reader::ByteReader;
