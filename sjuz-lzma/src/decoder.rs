//! LZMA decompression.
//!
//! The decoder models its window as the output buffer itself: back-references
//! index the bytes already produced, with an explicit floor (`window_start`)
//! marking the most recent dictionary reset. That keeps every copy
//! bounds-checked against data that actually exists and lets the LZMA2 layer
//! drive the same core chunk by chunk, appending to one growing buffer.

use crate::model::{
    DIST_ALIGN_BITS, END_POS_MODEL_INDEX, LEN_HIGH_BITS, LEN_LOW_BITS, LEN_MID_BITS, LenProbs,
    LzmaProbs, LzmaProps, MATCH_LEN_MIN, State,
};
use crate::range::RangeDecoder;
use sjuz_core::error::{Result, SjuzError};
use std::io::Read;

/// Distance value that terminates a stream.
const END_MARKER_DIST: u32 = 0xFFFF_FFFF;

/// Why a decode call stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// The requested number of bytes was produced.
    LimitReached,
    /// The stream's end marker was decoded.
    EndMarker,
}

/// Decode a match length.
fn decode_len<R: Read>(
    rc: &mut RangeDecoder<R>,
    probs: &mut LenProbs,
    pos_state: usize,
) -> Result<u32> {
    let base = MATCH_LEN_MIN as u32;

    if rc.decode_bit(&mut probs.choice)? == 0 {
        Ok(base + rc.decode_bit_tree(&mut probs.low[pos_state], LEN_LOW_BITS)?)
    } else if rc.decode_bit(&mut probs.choice2)? == 0 {
        Ok(base + (1 << LEN_LOW_BITS) + rc.decode_bit_tree(&mut probs.mid[pos_state], LEN_MID_BITS)?)
    } else {
        Ok(base
            + (1 << LEN_LOW_BITS)
            + (1 << LEN_MID_BITS)
            + rc.decode_bit_tree(&mut probs.high, LEN_HIGH_BITS)?)
    }
}

/// LZMA decoder state: probability cells, state machine, rep distances.
///
/// The state survives across calls so the LZMA2 layer can reset it (or not)
/// per chunk as the control bytes dictate.
pub struct LzmaState {
    probs: LzmaProbs,
    state: State,
    rep: [u32; 4],
}

impl LzmaState {
    /// Fresh decoder state for the given properties.
    pub fn new(props: LzmaProps) -> Self {
        Self {
            probs: LzmaProbs::new(props),
            state: State::new(),
            rep: [0; 4],
        }
    }

    /// Reset probabilities, state machine, and rep distances.
    pub fn reset(&mut self, props: LzmaProps) {
        *self = Self::new(props);
    }

    /// Decode a literal byte.
    fn decode_literal<R: Read>(
        &mut self,
        rc: &mut RangeDecoder<R>,
        pos: u64,
        prev_byte: u8,
        match_byte: u8,
    ) -> Result<u8> {
        let ctx = self.probs.literal.context(pos, prev_byte);
        let is_literal = self.state.is_literal();
        let probs = &mut self.probs.literal.probs[ctx];

        let mut symbol = 1usize;

        if is_literal {
            while symbol < 0x100 {
                let bit = rc.decode_bit(&mut probs[symbol])?;
                symbol = (symbol << 1) | bit as usize;
            }
        } else {
            // After a match, the byte at the last match distance steers the
            // cell selection until its bits stop agreeing.
            let mut match_byte = match_byte as usize;

            while symbol < 0x100 {
                let match_bit = (match_byte >> 7) & 1;
                match_byte <<= 1;

                let idx = 0x100 + (match_bit << 8) + symbol;
                let bit = rc.decode_bit(&mut probs[idx])? as usize;
                symbol = (symbol << 1) | bit;

                if bit != match_bit {
                    while symbol < 0x100 {
                        let bit = rc.decode_bit(&mut probs[symbol])?;
                        symbol = (symbol << 1) | bit as usize;
                    }
                    break;
                }
            }
        }

        Ok((symbol - 0x100) as u8)
    }

    /// Decode a match distance for a match of length `len`.
    fn decode_distance<R: Read>(&mut self, rc: &mut RangeDecoder<R>, len: u32) -> Result<u32> {
        let len_state = (len as usize - MATCH_LEN_MIN).min(3);

        let slot = rc.decode_bit_tree(&mut self.probs.distance.slot[len_state], 6)?;
        if slot < 4 {
            return Ok(slot);
        }

        let num_direct_bits = (slot >> 1) - 1;
        let base = (2 | (slot & 1)) << num_direct_bits;

        if (slot as usize) < END_POS_MODEL_INDEX {
            // Modeled distances: reverse tree at offset (base - slot).
            let offset = (base - slot) as usize;
            let low = rc.decode_bit_tree_reverse(
                &mut self.probs.distance.special[offset..],
                num_direct_bits,
            )?;
            Ok(base + low)
        } else {
            let direct = rc.decode_direct_bits(num_direct_bits - DIST_ALIGN_BITS)?;
            let align =
                rc.decode_bit_tree_reverse(&mut self.probs.distance.align, DIST_ALIGN_BITS)?;
            Ok(base + (direct << DIST_ALIGN_BITS) + align)
        }
    }

    /// Decode symbols into `out` until its length reaches `limit` or the
    /// stream's end marker appears.
    ///
    /// `window_start` is the index in `out` of the current dictionary floor;
    /// back-references may not reach below it. Positions for the literal and
    /// position-state contexts count from the floor. A match may overshoot
    /// `limit` by its tail; callers validate the final length.
    pub fn decode_into<R: Read>(
        &mut self,
        rc: &mut RangeDecoder<R>,
        out: &mut Vec<u8>,
        window_start: usize,
        limit: usize,
    ) -> Result<DecodeStatus> {
        debug_assert!(window_start <= out.len());

        while out.len() < limit {
            let pos = out.len() - window_start;
            let pos_state = pos & (self.probs.props.num_pos_states() - 1);
            let st = self.state.value();

            if rc.decode_bit(&mut self.probs.is_match[st][pos_state])? == 0 {
                let prev_byte = if pos == 0 { 0 } else { out[out.len() - 1] };
                let match_byte = if !self.state.is_literal() && (self.rep[0] as usize) < pos {
                    out[out.len() - self.rep[0] as usize - 1]
                } else {
                    0
                };

                let byte = self.decode_literal(rc, pos as u64, prev_byte, match_byte)?;
                out.push(byte);
                self.state.update_literal();
                continue;
            }

            let (len, dist) = if rc.decode_bit(&mut self.probs.is_rep[st])? == 0 {
                // Normal match: new distance.
                let len = decode_len(rc, &mut self.probs.match_len, pos_state)?;
                let dist = self.decode_distance(rc, len)?;

                self.rep[3] = self.rep[2];
                self.rep[2] = self.rep[1];
                self.rep[1] = self.rep[0];
                self.rep[0] = dist;

                if dist == END_MARKER_DIST {
                    return Ok(DecodeStatus::EndMarker);
                }

                self.state.update_match();
                (len, dist)
            } else if rc.decode_bit(&mut self.probs.is_rep0[st])? == 0 {
                if rc.decode_bit(&mut self.probs.is_rep0_long[st][pos_state])? == 0 {
                    // Short rep: a single byte at rep0.
                    let dist = self.rep[0] as usize;
                    if dist >= pos {
                        return Err(SjuzError::invalid_distance(dist as u64, out.len() as u64));
                    }

                    let byte = out[out.len() - dist - 1];
                    out.push(byte);
                    self.state.update_short_rep();
                    continue;
                }

                self.state.update_long_rep();
                let len = decode_len(rc, &mut self.probs.rep_len, pos_state)?;
                (len, self.rep[0])
            } else {
                let dist = if rc.decode_bit(&mut self.probs.is_rep1[st])? == 0 {
                    self.rep.swap(0, 1);
                    self.rep[0]
                } else if rc.decode_bit(&mut self.probs.is_rep2[st])? == 0 {
                    let d = self.rep[2];
                    self.rep[2] = self.rep[1];
                    self.rep[1] = self.rep[0];
                    self.rep[0] = d;
                    d
                } else {
                    let d = self.rep[3];
                    self.rep[3] = self.rep[2];
                    self.rep[2] = self.rep[1];
                    self.rep[1] = self.rep[0];
                    self.rep[0] = d;
                    d
                };

                self.state.update_long_rep();
                let len = decode_len(rc, &mut self.probs.rep_len, pos_state)?;
                (len, dist)
            };

            let dist = dist as usize;
            if dist >= pos {
                return Err(SjuzError::invalid_distance(dist as u64, out.len() as u64));
            }

            for _ in 0..len {
                let byte = out[out.len() - dist - 1];
                out.push(byte);
            }
        }

        Ok(DecodeStatus::LimitReached)
    }
}

/// Decompress a raw LZMA stream (no container header) of a known size.
///
/// Returns the produced bytes; a stream that ends early via its end marker
/// yields fewer bytes than requested, which the caller is expected to treat
/// as a size violation.
pub fn decompress_raw<R: Read>(reader: R, props: LzmaProps, unpacked_size: u64) -> Result<Vec<u8>> {
    let limit = usize::try_from(unpacked_size)
        .map_err(|_| SjuzError::header_corrupt("declared output size exceeds address space"))?;

    let mut rc = RangeDecoder::new(reader)?;
    let mut lzma = LzmaState::new(props);

    let mut out = Vec::with_capacity(limit.min(1 << 24));
    lzma.decode_into(&mut rc, &mut out, 0, limit)?;

    Ok(out)
}
