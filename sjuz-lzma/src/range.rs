//! Range coder.
//!
//! LZMA's entropy stage is a binary range coder: a 32-bit range is split
//! proportionally to an 11-bit adaptive probability for every bit, and
//! renormalized byte-wise whenever it drops below 2^24. The decoder and
//! encoder here share the probability update rule (shift by 5) so adaptive
//! cells stay in lockstep across a round trip.

use sjuz_core::error::{Result, SjuzError};
use std::io::Read;

/// Bits in a probability cell.
pub const PROB_BITS: u32 = 11;

/// Initial cell value (50%).
pub const PROB_INIT: u16 = 1 << (PROB_BITS - 1);

/// Exclusive upper bound of a probability cell.
pub const PROB_MAX: u16 = 1 << PROB_BITS;

/// Adaptation shift: the step each update moves a cell by.
pub const MOVE_BITS: u32 = 5;

/// Renormalization threshold.
const TOP_VALUE: u32 = 1 << 24;

/// Range decoder over a byte stream.
#[derive(Debug)]
pub struct RangeDecoder<R: Read> {
    reader: R,
    range: u32,
    code: u32,
}

impl<R: Read> RangeDecoder<R> {
    /// Initialize from the stream head: one zero pad byte, then four
    /// big-endian code bytes.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut head = [0u8; 5];
        reader.read_exact(&mut head)?;

        if head[0] != 0x00 {
            return Err(SjuzError::header_corrupt(
                "range coder stream must start with a zero byte",
            ));
        }

        let code = u32::from_be_bytes([head[1], head[2], head[3], head[4]]);

        Ok(Self {
            reader,
            range: 0xFFFF_FFFF,
            code,
        })
    }

    /// Refill when the range gets small.
    fn normalize(&mut self) -> Result<()> {
        if self.range < TOP_VALUE {
            let mut buf = [0u8; 1];
            self.reader.read_exact(&mut buf)?;
            self.range <<= 8;
            self.code = (self.code << 8) | buf[0] as u32;
        }
        Ok(())
    }

    /// Decode one bit against an adaptive probability cell.
    pub fn decode_bit(&mut self, prob: &mut u16) -> Result<u32> {
        self.normalize()?;

        let bound = (self.range >> PROB_BITS) * (*prob as u32);

        if self.code < bound {
            self.range = bound;
            *prob += (PROB_MAX - *prob) >> MOVE_BITS;
            Ok(0)
        } else {
            self.range -= bound;
            self.code -= bound;
            *prob -= *prob >> MOVE_BITS;
            Ok(1)
        }
    }

    /// Decode one bit at a fixed 50% probability.
    pub fn decode_direct_bit(&mut self) -> Result<u32> {
        self.normalize()?;

        self.range >>= 1;
        self.code = self.code.wrapping_sub(self.range);

        let bit = if (self.code as i32) < 0 {
            self.code = self.code.wrapping_add(self.range);
            0
        } else {
            1
        };

        Ok(bit)
    }

    /// Decode `count` fixed-probability bits, most significant first.
    pub fn decode_direct_bits(&mut self, count: u32) -> Result<u32> {
        let mut result = 0u32;
        for _ in 0..count {
            result = (result << 1) | self.decode_direct_bit()?;
        }
        Ok(result)
    }

    /// Decode a bit tree of `num_bits` levels (index 0 of `probs` unused).
    pub fn decode_bit_tree(&mut self, probs: &mut [u16], num_bits: u32) -> Result<u32> {
        let mut index = 1usize;

        for _ in 0..num_bits {
            let bit = self.decode_bit(&mut probs[index])?;
            index = (index << 1) | bit as usize;
        }

        Ok((index as u32) - (1 << num_bits))
    }

    /// Decode a bit tree with the result bits reversed.
    pub fn decode_bit_tree_reverse(&mut self, probs: &mut [u16], num_bits: u32) -> Result<u32> {
        let mut result = 0u32;
        let mut index = 1usize;

        for i in 0..num_bits {
            let bit = self.decode_bit(&mut probs[index])?;
            index = (index << 1) | bit as usize;
            result |= bit << i;
        }

        Ok(result)
    }

    /// Whether the code register drained to zero (clean stream end).
    pub fn is_finished_ok(&self) -> bool {
        self.code == 0
    }
}

/// Range encoder writing to an in-memory buffer.
#[derive(Debug)]
pub struct RangeEncoder {
    buffer: Vec<u8>,
    range: u32,
    low: u64,
    cache: u8,
    cache_size: u64,
}

impl RangeEncoder {
    /// Create an empty encoder.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            range: 0xFFFF_FFFF,
            low: 0,
            cache: 0,
            cache_size: 1,
        }
    }

    /// Emit pending bytes, propagating a carry out of the 32-bit low value.
    ///
    /// `low` is a 64-bit accumulator; bit 32 is the carry. Bytes are held
    /// back while they could still be bumped by a future carry (0xFF runs).
    fn shift_low(&mut self) {
        if self.low < 0xFF00_0000 || self.low > 0xFFFF_FFFF {
            let mut pending = self.cache;
            let carry = (self.low >> 32) as u8;

            loop {
                self.buffer.push(pending.wrapping_add(carry));
                pending = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }

            self.cache = (self.low >> 24) as u8;
        }

        self.cache_size += 1;
        self.low = (self.low << 8) & 0xFFFF_FFFF;
    }

    fn normalize(&mut self) {
        if self.range < TOP_VALUE {
            self.range <<= 8;
            self.shift_low();
        }
    }

    /// Encode one bit against an adaptive probability cell.
    pub fn encode_bit(&mut self, prob: &mut u16, bit: u32) {
        let bound = (self.range >> PROB_BITS) * (*prob as u32);

        if bit == 0 {
            self.range = bound;
            *prob += (PROB_MAX - *prob) >> MOVE_BITS;
        } else {
            self.low += bound as u64;
            self.range -= bound;
            *prob -= *prob >> MOVE_BITS;
        }

        self.normalize();
    }

    /// Encode one bit at a fixed 50% probability.
    pub fn encode_direct_bit(&mut self, bit: u32) {
        self.range >>= 1;
        if bit != 0 {
            self.low += self.range as u64;
        }
        self.normalize();
    }

    /// Encode `count` fixed-probability bits, most significant first.
    pub fn encode_direct_bits(&mut self, value: u32, count: u32) {
        for i in (0..count).rev() {
            self.encode_direct_bit((value >> i) & 1);
        }
    }

    /// Encode `value` through a bit tree of `num_bits` levels.
    pub fn encode_bit_tree(&mut self, probs: &mut [u16], num_bits: u32, value: u32) {
        let mut index = 1usize;

        for i in (0..num_bits).rev() {
            let bit = (value >> i) & 1;
            self.encode_bit(&mut probs[index], bit);
            index = (index << 1) | bit as usize;
        }
    }

    /// Encode `value` through a reversed bit tree.
    pub fn encode_bit_tree_reverse(&mut self, probs: &mut [u16], num_bits: u32, value: u32) {
        let mut index = 1usize;

        for i in 0..num_bits {
            let bit = (value >> i) & 1;
            self.encode_bit(&mut probs[index], bit);
            index = (index << 1) | bit as usize;
        }
    }

    /// Flush the accumulator and return the encoded bytes.
    ///
    /// The cache mechanism emits the leading zero pad byte the decoder
    /// expects, so the output is a complete stream.
    pub fn finish(mut self) -> Vec<u8> {
        for _ in 0..5 {
            self.shift_low();
        }
        self.buffer
    }
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}
