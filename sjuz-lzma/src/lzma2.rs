//! LZMA2 codec.
//!
//! LZMA2 frames LZMA in self-delimiting chunks. Each chunk opens with a
//! control byte:
//!
//! - `0x00`: end of stream
//! - `0x01` / `0x02`: uncompressed chunk, with / without dictionary reset
//! - `0x80..=0xFF`: LZMA chunk; bits 6..5 select the reset level:
//!   0 = continue, 1 = reset state, 2 = reset state + new properties,
//!   3 = reset state + new properties + reset dictionary
//!
//! Sizes are stored big-endian, minus one: the control byte's low 5 bits
//! extend the 16-bit uncompressed size to 21 bits.

use crate::decoder::LzmaState;
use crate::encoder::LzmaEncoder;
use crate::model::LzmaProps;
use crate::range::RangeDecoder;
use sjuz_core::error::{Result, SjuzError};
use std::io::Read;

/// Largest uncompressed payload of a single LZMA chunk.
const MAX_CHUNK_UNPACKED: usize = 1 << 21;

/// Largest packed payload of a single chunk.
const MAX_CHUNK_PACKED: usize = 1 << 16;

/// Dictionary size encoded by an LZMA2 properties byte.
///
/// `(2 | (bits & 1)) << (bits / 2 + 11)`, with 40 meaning 4 GiB - 1 and
/// anything above 40 invalid.
pub fn dict_size_from_props(props: u8) -> Option<u32> {
    if props > 40 {
        return None;
    }
    if props == 40 {
        return Some(0xFFFF_FFFF);
    }

    let base = 2 | (props as u32 & 1);
    let shift = (props as u32 / 2) + 11;
    Some(base << shift)
}

/// Smallest LZMA2 properties byte whose dictionary covers `dict_size`.
pub fn props_from_dict_size(dict_size: u32) -> u8 {
    for props in 0..=40 {
        if dict_size_from_props(props).is_some_and(|d| d >= dict_size) {
            return props;
        }
    }
    40
}

/// Streaming LZMA2 decoder.
///
/// Holds the LZMA state and dictionary floor across chunks so continuation
/// chunks (reset level 0/1, uncompressed chunks without reset) see the
/// window the format promises them.
#[derive(Default)]
pub struct Lzma2Decoder {
    props: Option<LzmaProps>,
    lzma: Option<LzmaState>,
    window_start: usize,
}

impl Lzma2Decoder {
    /// Create a decoder with no chunk history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a complete LZMA2 stream.
    pub fn decode<R: Read>(&mut self, reader: &mut R) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        loop {
            let mut control = [0u8; 1];
            reader.read_exact(&mut control)?;
            let control = control[0];

            match control {
                0x00 => break,
                0x01 | 0x02 => {
                    let size = read_be16(reader)? as usize + 1;

                    if control == 0x01 {
                        self.window_start = out.len();
                    }

                    let start = out.len();
                    out.resize(start + size, 0);
                    reader.read_exact(&mut out[start..])?;
                }
                0x80..=0xFF => self.decode_lzma_chunk(reader, &mut out, control)?,
                _ => {
                    return Err(SjuzError::header_corrupt(format!(
                        "invalid LZMA2 control byte 0x{control:02X}"
                    )));
                }
            }
        }

        Ok(out)
    }

    fn decode_lzma_chunk<R: Read>(
        &mut self,
        reader: &mut R,
        out: &mut Vec<u8>,
        control: u8,
    ) -> Result<()> {
        let unpacked_size = (((control as usize & 0x1F) << 16) | read_be16(reader)? as usize) + 1;
        let packed_size = read_be16(reader)? as usize + 1;
        let reset = (control >> 5) & 0x3;

        if reset >= 2 {
            let mut props_byte = [0u8; 1];
            reader.read_exact(&mut props_byte)?;
            self.props = Some(LzmaProps::from_byte(props_byte[0]).ok_or_else(|| {
                SjuzError::header_corrupt(format!("invalid LZMA properties byte {}", props_byte[0]))
            })?);
        }

        if reset == 3 {
            self.window_start = out.len();
        }

        if reset >= 1 {
            let props = self
                .props
                .ok_or_else(|| SjuzError::header_corrupt("LZMA2 state reset without properties"))?;
            match &mut self.lzma {
                Some(state) => state.reset(props),
                None => self.lzma = Some(LzmaState::new(props)),
            }
        }

        let lzma = self
            .lzma
            .as_mut()
            .ok_or_else(|| SjuzError::header_corrupt("LZMA2 chunk continues missing state"))?;

        let mut packed = vec![0u8; packed_size];
        reader.read_exact(&mut packed)?;

        let mut rc = RangeDecoder::new(packed.as_slice())?;
        let before = out.len();
        lzma.decode_into(&mut rc, out, self.window_start, before + unpacked_size)?;

        let produced = (out.len() - before) as u64;
        if produced != unpacked_size as u64 {
            return Err(SjuzError::size_mismatch(unpacked_size as u64, produced));
        }

        Ok(())
    }
}

fn read_be16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

/// Decode a complete in-memory LZMA2 stream.
pub fn decode_lzma2(data: &[u8]) -> Result<Vec<u8>> {
    let mut reader = data;
    Lzma2Decoder::new().decode(&mut reader)
}

/// Encode `data` as an LZMA2 stream.
///
/// Small-enough inputs become a single LZMA chunk (full reset, fresh
/// properties); inputs the chunk framing cannot hold, or that the codec
/// fails to shrink, fall back to uncompressed chunks.
pub fn encode_lzma2(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();

    if data.is_empty() {
        out.push(0x00);
        return out;
    }

    if data.len() <= MAX_CHUNK_UNPACKED {
        let encoder = LzmaEncoder::new(1 << 16);
        let props = encoder.props();
        let packed = encoder.compress(data);

        if packed.len() <= MAX_CHUNK_PACKED && packed.len() < data.len() {
            let unpacked_minus_1 = data.len() - 1;
            // Reset level 3: state + properties + dictionary.
            out.push(0xE0 | ((unpacked_minus_1 >> 16) & 0x1F) as u8);
            out.extend_from_slice(&((unpacked_minus_1 & 0xFFFF) as u16).to_be_bytes());
            out.extend_from_slice(&((packed.len() - 1) as u16).to_be_bytes());
            out.push(props.to_byte());
            out.extend_from_slice(&packed);
            out.push(0x00);
            return out;
        }
    }

    for (i, chunk) in data.chunks(MAX_CHUNK_PACKED).enumerate() {
        out.push(if i == 0 { 0x01 } else { 0x02 });
        out.extend_from_slice(&((chunk.len() - 1) as u16).to_be_bytes());
        out.extend_from_slice(chunk);
    }
    out.push(0x00);
    out
}
