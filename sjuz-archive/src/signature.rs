//! The fixed 32-byte signature header.
//!
//! Layout:
//!
//! ```text
//! offset 0   6 magic bytes: 37 7A BC AF 27 1C
//! offset 6   2 version bytes (major, minor)
//! offset 8   CRC-32 of bytes 12..32 (little-endian)
//! offset 12  next header offset (u64, relative to byte 32)
//! offset 20  next header size   (u64)
//! offset 28  next header CRC-32 (u32)
//! ```
//!
//! The "next header" is the metadata block; it sits at the end of the file,
//! after the packed streams.

use sjuz_core::crc::Crc32;
use sjuz_core::error::{Result, SjuzError};

/// 7z magic bytes: `'7' 'z' BC AF 27 1C`.
pub const SIGNATURE: [u8; 6] = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

/// Size of the signature header.
pub const SIGNATURE_HEADER_LEN: usize = 32;

/// The validated start header: where the metadata block lives.
#[derive(Debug, Clone, Copy)]
pub struct StartHeader {
    /// Metadata block offset, relative to the end of the signature header.
    pub next_offset: u64,
    /// Metadata block size in bytes.
    pub next_size: u64,
    /// Stored CRC-32 of the metadata block.
    pub next_crc: u32,
}

/// Parse and validate the signature header of a complete archive.
pub fn parse_signature_header(data: &[u8]) -> Result<StartHeader> {
    if data.len() < SIGNATURE_HEADER_LEN {
        return Err(SjuzError::truncated(SIGNATURE_HEADER_LEN - data.len()));
    }

    if data[0..6] != SIGNATURE {
        return Err(SjuzError::header_corrupt(format!(
            "signature mismatch: {:02x?}",
            &data[0..6]
        )));
    }

    let stored_crc = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    let computed_crc = Crc32::compute(&data[12..32]);
    if stored_crc != computed_crc {
        return Err(SjuzError::header_corrupt(format!(
            "start header checksum mismatch: stored {stored_crc:#010x}, computed {computed_crc:#010x}"
        )));
    }

    let next_offset = u64::from_le_bytes([
        data[12], data[13], data[14], data[15], data[16], data[17], data[18], data[19],
    ]);
    let next_size = u64::from_le_bytes([
        data[20], data[21], data[22], data[23], data[24], data[25], data[26], data[27],
    ]);
    let next_crc = u32::from_le_bytes([data[28], data[29], data[30], data[31]]);

    let available = (data.len() - SIGNATURE_HEADER_LEN) as u64;
    let end = next_offset
        .checked_add(next_size)
        .ok_or_else(|| SjuzError::header_corrupt("metadata block range overflows"))?;
    if end > available {
        return Err(SjuzError::truncated((end - available) as usize));
    }

    Ok(StartHeader {
        next_offset,
        next_size,
        next_crc,
    })
}

/// Slice out the metadata block and validate its stored checksum.
pub fn next_header_bytes<'a>(data: &'a [u8], start: &StartHeader) -> Result<&'a [u8]> {
    let begin = SIGNATURE_HEADER_LEN + start.next_offset as usize;
    let header = &data[begin..begin + start.next_size as usize];

    if start.next_size > 0 {
        let computed = Crc32::compute(header);
        if computed != start.next_crc {
            return Err(SjuzError::header_corrupt(format!(
                "metadata block checksum mismatch: stored {:#010x}, computed {computed:#010x}",
                start.next_crc
            )));
        }
    }

    Ok(header)
}
