//! LZMA compression (greedy parsing).
//!
//! A hash-chain match finder feeds the range encoder: at each position the
//! longest rep match and the longest chained match compete, with a mild bias
//! toward rep matches since they cost no distance bits. Streams always end
//! with the 0xFFFFFFFF distance marker, so a decoder with a larger declared
//! size stops cleanly.
//!
//! This exists to exercise the decoder: archive construction is not part of
//! the public decode surface, but round-trip coverage of the codec is.

use crate::model::{
    DIST_ALIGN_BITS, END_POS_MODEL_INDEX, LEN_HIGH_BITS, LEN_LOW_BITS, LEN_MID_BITS, LenProbs,
    LzmaProbs, LzmaProps, MATCH_LEN_MIN,
};
use crate::range::RangeEncoder;

/// Maximum encodable match length.
const MATCH_LEN_MAX: usize = 273;

/// Hash table size (64K entries).
const HASH_SIZE: usize = 1 << 16;

/// How many chain links the match finder follows per position.
const CHAIN_DEPTH: usize = 128;

/// Encode a match length.
fn encode_len(rc: &mut RangeEncoder, probs: &mut LenProbs, len: u32, pos_state: usize) {
    let len = len - MATCH_LEN_MIN as u32;

    if len < (1 << LEN_LOW_BITS) {
        rc.encode_bit(&mut probs.choice, 0);
        rc.encode_bit_tree(&mut probs.low[pos_state], LEN_LOW_BITS, len);
    } else if len < (1 << LEN_LOW_BITS) + (1 << LEN_MID_BITS) {
        rc.encode_bit(&mut probs.choice, 1);
        rc.encode_bit(&mut probs.choice2, 0);
        rc.encode_bit_tree(
            &mut probs.mid[pos_state],
            LEN_MID_BITS,
            len - (1 << LEN_LOW_BITS),
        );
    } else {
        rc.encode_bit(&mut probs.choice, 1);
        rc.encode_bit(&mut probs.choice2, 1);
        rc.encode_bit_tree(
            &mut probs.high,
            LEN_HIGH_BITS,
            len - (1 << LEN_LOW_BITS) - (1 << LEN_MID_BITS),
        );
    }
}

/// Slot for a (0-based) distance.
fn dist_slot(dist: u32) -> u32 {
    if dist < 4 {
        return dist;
    }

    let bits = 32 - dist.leading_zeros();
    ((bits - 1) << 1) | ((dist >> (bits - 2)) & 1)
}

/// Greedy LZMA encoder.
pub struct LzmaEncoder {
    rc: RangeEncoder,
    probs: LzmaProbs,
    state: crate::model::State,
    rep: [u32; 4],
    /// Head of the hash chain per 3-byte hash.
    hash_head: Vec<u32>,
    /// Previous position with the same hash, per position.
    hash_chain: Vec<u32>,
    dict_size: usize,
    pos_total: u64,
}

impl LzmaEncoder {
    /// Create an encoder with default properties and the given window size.
    pub fn new(dict_size: u32) -> Self {
        let props = LzmaProps::default();

        Self {
            rc: RangeEncoder::new(),
            probs: LzmaProbs::new(props),
            state: crate::model::State::new(),
            rep: [0; 4],
            hash_head: vec![u32::MAX; HASH_SIZE],
            hash_chain: Vec::new(),
            dict_size: dict_size.max(4096) as usize,
            pos_total: 0,
        }
    }

    /// Properties this encoder writes with.
    pub fn props(&self) -> LzmaProps {
        self.probs.props
    }

    /// Window size.
    pub fn dict_size(&self) -> u32 {
        self.dict_size as u32
    }

    fn hash3(data: &[u8]) -> usize {
        // FNV-1a over the 3-byte prefix.
        let mut h = 2166136261u32;
        h ^= data[0] as u32;
        h = h.wrapping_mul(16777619);
        h ^= data[1] as u32;
        h = h.wrapping_mul(16777619);
        h ^= data[2] as u32;
        h = h.wrapping_mul(16777619);
        (h as usize) & (HASH_SIZE - 1)
    }

    /// Longest match reachable through the hash chain, as (0-based distance,
    /// length).
    fn find_match(&self, data: &[u8], pos: usize) -> Option<(u32, u32)> {
        if pos + MATCH_LEN_MIN + 1 > data.len() {
            return None;
        }

        let hash = Self::hash3(&data[pos..]);
        let mut candidate = self.hash_head[hash] as usize;

        if candidate == u32::MAX as usize {
            return None;
        }

        let max_len = (data.len() - pos).min(MATCH_LEN_MAX);
        let mut best_len = 0usize;
        let mut best_dist = 0usize;
        let mut steps = 0;

        while candidate < pos && steps < CHAIN_DEPTH {
            let dist = pos - candidate;
            if dist > self.dict_size {
                break;
            }

            if data[pos] == data[candidate]
                && data[pos + 1] == data[candidate + 1]
                && data[pos + 2] == data[candidate + 2]
            {
                let mut len = 3usize;
                while len < max_len && data[pos + len] == data[candidate + len] {
                    len += 1;
                }

                if len > best_len || (len == best_len && dist < best_dist) {
                    best_len = len;
                    best_dist = dist;
                    if best_len >= max_len {
                        break;
                    }
                }
            }

            match self.hash_chain.get(candidate) {
                Some(&next) if (next as usize) < candidate => candidate = next as usize,
                _ => break,
            }

            steps += 1;
        }

        if best_len < MATCH_LEN_MIN + 1 {
            return None;
        }

        Some(((best_dist - 1) as u32, best_len as u32))
    }

    /// Record `pos` in the hash chain.
    fn update_hash(&mut self, data: &[u8], pos: usize) {
        if pos + 3 > data.len() {
            return;
        }

        if pos >= self.hash_chain.len() {
            self.hash_chain.resize(pos + 1, u32::MAX);
        }

        let hash = Self::hash3(&data[pos..]);
        self.hash_chain[pos] = self.hash_head[hash];
        self.hash_head[hash] = pos as u32;
    }

    /// Match length at the rep distance `rep_idx`, 0 if unusable.
    fn rep_match_len(&self, data: &[u8], pos: usize, rep_idx: usize) -> u32 {
        let dist = self.rep[rep_idx] as usize;
        if dist >= pos {
            return 0;
        }

        let candidate = pos - dist - 1;
        let max_len = (data.len() - pos).min(MATCH_LEN_MAX);
        let mut len = 0usize;

        while len < max_len && data[pos + len] == data[candidate + len] {
            len += 1;
        }

        len as u32
    }

    fn encode_literal(&mut self, byte: u8, prev_byte: u8, match_byte: u8) {
        let ctx = self.probs.literal.context(self.pos_total, prev_byte);
        let is_literal = self.state.is_literal();
        let probs = &mut self.probs.literal.probs[ctx];

        let mut symbol = (byte as usize) | 0x100;
        let mut node = 1usize;

        if is_literal {
            while node < 0x100 {
                let bit = (symbol >> 7) & 1;
                symbol <<= 1;
                self.rc.encode_bit(&mut probs[node], bit as u32);
                node = (node << 1) | bit;
            }
        } else {
            let mut match_symbol = (match_byte as usize) << 1;

            while node < 0x100 {
                let match_bit = (match_symbol >> 8) & 1;
                match_symbol <<= 1;

                let bit = (symbol >> 7) & 1;
                symbol <<= 1;

                let idx = 0x100 + (match_bit << 8) + node;
                self.rc.encode_bit(&mut probs[idx], bit as u32);
                node = (node << 1) | bit;

                if bit != match_bit {
                    while node < 0x100 {
                        let bit = (symbol >> 7) & 1;
                        symbol <<= 1;
                        self.rc.encode_bit(&mut probs[node], bit as u32);
                        node = (node << 1) | bit;
                    }
                    break;
                }
            }
        }
    }

    fn encode_distance(&mut self, dist: u32, len: u32) {
        let len_state = (len as usize - MATCH_LEN_MIN).min(3);
        let slot = dist_slot(dist);

        self.rc
            .encode_bit_tree(&mut self.probs.distance.slot[len_state], 6, slot);

        if slot < 4 {
            return;
        }

        let num_direct_bits = (slot >> 1) - 1;
        let base = (2 | (slot & 1)) << num_direct_bits;
        let reduced = dist - base;

        if (slot as usize) < END_POS_MODEL_INDEX {
            let offset = (base - slot) as usize;
            self.rc.encode_bit_tree_reverse(
                &mut self.probs.distance.special[offset..],
                num_direct_bits,
                reduced,
            );
        } else {
            self.rc
                .encode_direct_bits(reduced >> DIST_ALIGN_BITS, num_direct_bits - DIST_ALIGN_BITS);
            self.rc.encode_bit_tree_reverse(
                &mut self.probs.distance.align,
                DIST_ALIGN_BITS,
                reduced & ((1 << DIST_ALIGN_BITS) - 1),
            );
        }
    }

    /// Compress `data` into a raw LZMA stream ending with the end marker.
    pub fn compress(mut self, data: &[u8]) -> Vec<u8> {
        let mut i = 0;

        while i < data.len() {
            let pos_state = (self.pos_total as usize) & (self.probs.props.num_pos_states() - 1);
            let st = self.state.value();

            // Longest rep match, if any.
            let mut best_rep: Option<(usize, u32)> = None;
            for rep_idx in 0..4 {
                let len = self.rep_match_len(data, i, rep_idx);
                if len >= MATCH_LEN_MIN as u32 && best_rep.is_none_or(|(_, l)| len > l) {
                    best_rep = Some((rep_idx, len));
                }
            }

            let normal = self.find_match(data, i);

            let chosen = match (best_rep, normal) {
                (Some((rep_idx, rep_len)), Some((_, len)))
                    if rep_len >= len || (rep_len >= 3 && rep_idx == 0) =>
                {
                    Some((true, rep_idx, rep_len))
                }
                (_, Some((dist, len))) => Some((false, dist as usize, len)),
                (Some((rep_idx, rep_len)), None) => Some((true, rep_idx, rep_len)),
                (None, None) => None,
            };

            match chosen {
                None => {
                    self.rc
                        .encode_bit(&mut self.probs.is_match[st][pos_state], 0);

                    let prev_byte = if i > 0 { data[i - 1] } else { 0 };
                    let match_byte = if !self.state.is_literal() && (self.rep[0] as usize) < i {
                        data[i - self.rep[0] as usize - 1]
                    } else {
                        0
                    };

                    self.encode_literal(data[i], prev_byte, match_byte);
                    self.state.update_literal();
                    self.pos_total += 1;

                    self.update_hash(data, i);
                    i += 1;
                }
                Some((is_rep, idx_or_dist, len)) => {
                    self.rc
                        .encode_bit(&mut self.probs.is_match[st][pos_state], 1);

                    if is_rep {
                        self.rc.encode_bit(&mut self.probs.is_rep[st], 1);

                        let rep_idx = idx_or_dist;
                        if rep_idx == 0 {
                            self.rc.encode_bit(&mut self.probs.is_rep0[st], 0);
                            self.rc
                                .encode_bit(&mut self.probs.is_rep0_long[st][pos_state], 1);
                        } else {
                            self.rc.encode_bit(&mut self.probs.is_rep0[st], 1);

                            if rep_idx == 1 {
                                self.rc.encode_bit(&mut self.probs.is_rep1[st], 0);
                            } else {
                                self.rc.encode_bit(&mut self.probs.is_rep1[st], 1);
                                self.rc
                                    .encode_bit(&mut self.probs.is_rep2[st], (rep_idx != 2) as u32);
                            }

                            // Promote the used distance to rep0.
                            let dist = self.rep[rep_idx];
                            for j in (1..=rep_idx).rev() {
                                self.rep[j] = self.rep[j - 1];
                            }
                            self.rep[0] = dist;
                        }

                        encode_len(&mut self.rc, &mut self.probs.rep_len, len, pos_state);
                        self.state.update_long_rep();
                    } else {
                        self.rc.encode_bit(&mut self.probs.is_rep[st], 0);

                        let dist = idx_or_dist as u32;
                        encode_len(&mut self.rc, &mut self.probs.match_len, len, pos_state);
                        self.encode_distance(dist, len);

                        self.rep[3] = self.rep[2];
                        self.rep[2] = self.rep[1];
                        self.rep[1] = self.rep[0];
                        self.rep[0] = dist;

                        self.state.update_match();
                    }

                    self.pos_total += len as u64;
                    for j in 0..len as usize {
                        self.update_hash(data, i + j);
                    }
                    i += len as usize;
                }
            }
        }

        // End marker: a normal match at the reserved distance.
        let pos_state = (self.pos_total as usize) & (self.probs.props.num_pos_states() - 1);
        let st = self.state.value();

        self.rc
            .encode_bit(&mut self.probs.is_match[st][pos_state], 1);
        self.rc.encode_bit(&mut self.probs.is_rep[st], 0);
        encode_len(
            &mut self.rc,
            &mut self.probs.match_len,
            MATCH_LEN_MIN as u32,
            pos_state,
        );
        self.encode_distance(0xFFFF_FFFF, MATCH_LEN_MIN as u32);

        self.rc.finish()
    }
}

/// Compress `data` into a raw LZMA stream with default properties.
pub fn compress_raw(data: &[u8], dict_size: u32) -> Vec<u8> {
    LzmaEncoder::new(dict_size).compress(data)
}
