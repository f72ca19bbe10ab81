//! # sjuz Archive
//!
//! Single-pass 7z archive decoding: hand the decoder a complete archive as
//! one byte slice and get back the logical directory of decompressed files.
//!
//! ```rust,no_run
//! let bytes = std::fs::read("archive.7z").unwrap();
//! let archive = sjuz_archive::decompress(&bytes).unwrap();
//!
//! println!("{}", archive.id);
//! for file in &archive.files {
//!     println!("{}: {} bytes (crc ok: {})", file.name, file.data.len(), file.crc_ok);
//! }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! bytes -> signature header -> metadata block -> folder model
//!       -> per-folder codec chains -> file table assembly -> Archive
//! ```
//!
//! The metadata block may itself be stored compressed (an "encoded header");
//! it is then decoded through the same folder machinery before parsing.
//! Folders are independent once the model is built; with the `parallel`
//! feature they decode across rayon workers.
//!
//! ## Supported coders
//!
//! Copy, LZMA, LZMA2, Delta, and the x86 BCJ filter. Any other method fails
//! the decode with an `UnsupportedCodec` error naming the method ID.
//! Encrypted and multi-volume archives are out of scope.
//!
//! ## Error model
//!
//! Truncated input, corrupt or inconsistent metadata, unsupported coders,
//! and folder size violations are fatal. A failed per-file checksum is not:
//! the file is returned with `crc_ok == false` so callers inspecting a
//! damaged archive still see the recoverable remainder.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod archive;
pub mod codec;
pub mod files;
pub mod filters;
pub mod method;
pub mod property;
pub mod signature;
pub mod streams;

// Re-exports
pub use archive::{Archive, ArchiveFile, decompress};
pub use files::FileEntry;
pub use method::MethodId;
pub use property::PropertyId;
pub use signature::{SIGNATURE, StartHeader};
pub use sjuz_core::error::{Result, SjuzError};
pub use streams::{Coder, Folder, StreamsInfo};
