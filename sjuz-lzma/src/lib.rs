//! # sjuz LZMA
//!
//! LZMA and LZMA2 codecs for the sjuz 7z decoder.
//!
//! The decode direction is the load-bearing half: 7z folders overwhelmingly
//! use LZMA (method `03 01 01`) or LZMA2 (method `21`), and the container
//! layer drives [`decompress_raw`] / [`Lzma2Decoder`] with the sizes and
//! properties the archive metadata declares. A greedy encoder is included so
//! the codec can be exercised round-trip by tests and fixtures.
//!
//! ## Structure
//!
//! - [`model`]: probability cells, properties, the state machine
//! - [`range`]: the binary range coder (decoder and encoder)
//! - [`decoder`]: the LZMA symbol decoder over a growing output window
//! - [`encoder`]: greedy hash-chain compression
//! - [`lzma2`]: the chunked LZMA2 framing
//!
//! ## Example
//!
//! ```rust
//! use sjuz_lzma::{compress_raw, decompress_raw, LzmaProps};
//! use std::io::Cursor;
//!
//! let data = b"seven zip folders feed coders in declared order";
//! let packed = compress_raw(data, 1 << 16);
//! let unpacked = decompress_raw(
//!     Cursor::new(packed),
//!     LzmaProps::default(),
//!     data.len() as u64,
//! ).unwrap();
//! assert_eq!(unpacked, data);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decoder;
pub mod encoder;
pub mod lzma2;
pub mod model;
pub mod range;

// Re-exports
pub use decoder::{DecodeStatus, LzmaState, decompress_raw};
pub use encoder::{LzmaEncoder, compress_raw};
pub use lzma2::{
    Lzma2Decoder, decode_lzma2, dict_size_from_props, encode_lzma2, props_from_dict_size,
};
pub use model::{LzmaProbs, LzmaProps, State};
pub use range::{RangeDecoder, RangeEncoder};
