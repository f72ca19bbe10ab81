//! Streams and folder model.
//!
//! The metadata block describes the packed payload three ways at once:
//!
//! - `PackInfo`: where the packed streams sit and how big they are
//! - `UnpackInfo`: folders, the coder chains that turn packed streams into one
//!   contiguous decompressed range each
//! - `SubStreamsInfo`: how each folder's output splits into per-file ranges
//!
//! A folder's coders form a small DAG wired by bind pairs (an output stream
//! feeding another coder's input). This decoder supports the chain case:
//! every coder single-input/single-output, one packed stream entering the
//! chain, one unbound output leaving it. The wiring is resolved through
//! explicit stream-index maps with validated degrees and a step bound, so a
//! corrupt graph fails instead of looping.

use crate::method::MethodId;
use crate::property::PropertyId;
use sjuz_core::error::{Result, SjuzError};
use sjuz_core::reader::ByteReader;

/// Location and sizes of the packed streams.
#[derive(Debug, Clone, Default)]
pub struct PackInfo {
    /// Offset of the first packed stream, relative to the end of the
    /// signature header.
    pub pack_pos: u64,
    /// Size of each packed stream.
    pub pack_sizes: Vec<u64>,
    /// Stored CRC per packed stream, where defined.
    pub pack_crcs: Vec<Option<u32>>,
}

/// One coder stage within a folder.
#[derive(Debug, Clone)]
pub struct Coder {
    /// Decoded method.
    pub method: MethodId,
    /// Raw method identifier bytes, kept for precise error reports.
    pub raw_id: Vec<u8>,
    /// Number of input streams.
    pub num_in_streams: u64,
    /// Number of output streams.
    pub num_out_streams: u64,
    /// Method-specific properties blob.
    pub properties: Vec<u8>,
}

/// An output-to-input wiring between two coders of one folder.
#[derive(Debug, Clone, Copy)]
pub struct BindPair {
    /// Global input stream index fed by this pair.
    pub in_index: u64,
    /// Global output stream index feeding it.
    pub out_index: u64,
}

/// A folder: a coder chain producing one decompressed byte range.
#[derive(Debug, Clone)]
pub struct Folder {
    /// Coders, in declaration order.
    pub coders: Vec<Coder>,
    /// Stream wiring.
    pub bind_pairs: Vec<BindPair>,
    /// Global input stream indices fed from packed data.
    pub packed_streams: Vec<u64>,
    /// Declared output size per global output stream.
    pub unpack_sizes: Vec<u64>,
    /// Stored CRC of the folder's final output, if defined.
    pub crc: Option<u32>,
    /// Number of substreams the output splits into (default 1).
    pub num_substreams: u64,
}

impl Folder {
    /// Total input streams across all coders.
    pub fn total_in_streams(&self) -> u64 {
        self.coders.iter().map(|c| c.num_in_streams).sum()
    }

    /// Total output streams across all coders.
    pub fn total_out_streams(&self) -> u64 {
        self.coders.iter().map(|c| c.num_out_streams).sum()
    }

    /// Index of the coder owning the global input stream `index`.
    fn coder_of_in_stream(&self, index: u64) -> Result<usize> {
        let mut first = 0u64;
        for (i, coder) in self.coders.iter().enumerate() {
            if index < first + coder.num_in_streams {
                return Ok(i);
            }
            first += coder.num_in_streams;
        }
        Err(SjuzError::header_corrupt(format!(
            "input stream index {index} out of range"
        )))
    }

    /// Global output stream index of coder `coder_index`'s first output.
    fn first_out_stream(&self, coder_index: usize) -> u64 {
        self.coders[..coder_index]
            .iter()
            .map(|c| c.num_out_streams)
            .sum()
    }

    fn bind_pair_for_out_stream(&self, index: u64) -> Option<&BindPair> {
        self.bind_pairs.iter().find(|bp| bp.out_index == index)
    }

    fn bind_pair_for_in_stream(&self, index: u64) -> Option<&BindPair> {
        self.bind_pairs.iter().find(|bp| bp.in_index == index)
    }

    /// Size of the folder's final (unbound) output.
    pub fn unpack_size(&self) -> u64 {
        for index in (0..self.total_out_streams()).rev() {
            if self.bind_pair_for_out_stream(index).is_none() {
                return self.unpack_sizes.get(index as usize).copied().unwrap_or(0);
            }
        }
        0
    }

    /// Declared output size of coder `coder_index`.
    pub fn coder_unpack_size(&self, coder_index: usize) -> Result<u64> {
        let out_stream = self.first_out_stream(coder_index) as usize;
        self.unpack_sizes
            .get(out_stream)
            .copied()
            .ok_or_else(|| SjuzError::header_corrupt("missing coder output size"))
    }

    /// Coder indices in decode order: from the coder consuming the packed
    /// stream, following bind pairs, to the coder producing the folder
    /// output.
    ///
    /// Multi-input or multi-output coders (e.g. BCJ2) are reported as
    /// unsupported; the chain walk is bounded, so a cyclic graph fails.
    pub fn ordered_coders(&self) -> Result<Vec<usize>> {
        for coder in &self.coders {
            if coder.num_in_streams != 1 || coder.num_out_streams != 1 {
                return Err(SjuzError::unsupported_codec(&coder.raw_id));
            }
        }

        let start = *self
            .packed_streams
            .first()
            .ok_or_else(|| SjuzError::header_corrupt("folder has no packed stream"))?;

        let mut order = Vec::with_capacity(self.coders.len());
        let mut coder_index = self.coder_of_in_stream(start)?;

        loop {
            if order.len() >= self.coders.len() {
                return Err(SjuzError::header_corrupt("coder chain does not terminate"));
            }
            order.push(coder_index);

            let out_stream = self.first_out_stream(coder_index);
            match self.bind_pair_for_out_stream(out_stream) {
                Some(pair) => coder_index = self.coder_of_in_stream(pair.in_index)?,
                None => break,
            }
        }

        Ok(order)
    }
}

/// Per-substream layout across all folders, flattened in folder order.
#[derive(Debug, Clone, Default)]
pub struct SubStreamsInfo {
    /// Size of each substream.
    pub sizes: Vec<u64>,
    /// Stored CRC per substream, where defined or implied by a folder CRC.
    pub crcs: Vec<Option<u32>>,
}

/// The complete streams description.
#[derive(Debug, Clone)]
pub struct StreamsInfo {
    /// Packed stream layout.
    pub pack_info: PackInfo,
    /// Folder list.
    pub folders: Vec<Folder>,
    /// Substream layout (synthesized as one-per-folder when absent).
    pub substreams: SubStreamsInfo,
}

/// Parse a `StreamsInfo` section (the tag byte already consumed).
pub fn read_streams_info(rd: &mut ByteReader<'_>) -> Result<StreamsInfo> {
    let mut nid = PropertyId::read(rd)?;

    let mut pack_info = None;
    let mut folders: Vec<Folder> = Vec::new();
    let mut substreams = None;

    if nid == PropertyId::PackInfo {
        pack_info = Some(read_pack_info(rd)?);
        nid = PropertyId::read(rd)?;
    }

    if nid == PropertyId::UnpackInfo {
        folders = read_unpack_info(rd)?;
        nid = PropertyId::read(rd)?;
    }

    if nid == PropertyId::SubStreamsInfo {
        substreams = Some(read_substreams_info(rd, &mut folders)?);
        nid = PropertyId::read(rd)?;
    }

    if nid != PropertyId::End {
        return Err(SjuzError::header_corrupt(format!(
            "badly terminated streams info ({nid:?})"
        )));
    }

    let pack_info =
        pack_info.ok_or_else(|| SjuzError::header_corrupt("streams info without pack info"))?;

    // Without an explicit substreams section every folder is one substream
    // and the folder CRC doubles as the substream CRC.
    let substreams = match substreams {
        Some(info) => info,
        None => {
            for folder in &mut folders {
                folder.num_substreams = 1;
            }
            SubStreamsInfo {
                sizes: folders.iter().map(|f| f.unpack_size()).collect(),
                crcs: folders.iter().map(|f| f.crc).collect(),
            }
        }
    };

    Ok(StreamsInfo {
        pack_info,
        folders,
        substreams,
    })
}

fn read_pack_info(rd: &mut ByteReader<'_>) -> Result<PackInfo> {
    let pack_pos = rd.read_number()?;
    let num_streams = rd.read_number_usize()?;
    let mut nid = PropertyId::read(rd)?;

    let mut pack_sizes = Vec::with_capacity(num_streams.min(1024));
    if nid == PropertyId::Size {
        for _ in 0..num_streams {
            pack_sizes.push(rd.read_number()?);
        }
        nid = PropertyId::read(rd)?;
    }

    if pack_sizes.len() != num_streams {
        return Err(SjuzError::header_corrupt("missing pack stream sizes"));
    }

    let mut pack_crcs = vec![None; num_streams];
    if nid == PropertyId::Crc {
        let defined = rd.read_all_or_bits(num_streams)?;
        for (crc, &is_defined) in pack_crcs.iter_mut().zip(defined.iter()) {
            if is_defined {
                *crc = Some(rd.read_u32_le()?);
            }
        }
        nid = PropertyId::read(rd)?;
    }

    if nid != PropertyId::End {
        return Err(SjuzError::header_corrupt(format!(
            "badly terminated pack info ({nid:?})"
        )));
    }

    Ok(PackInfo {
        pack_pos,
        pack_sizes,
        pack_crcs,
    })
}

fn read_unpack_info(rd: &mut ByteReader<'_>) -> Result<Vec<Folder>> {
    let nid = PropertyId::read(rd)?;
    if nid != PropertyId::Folder {
        return Err(SjuzError::header_corrupt(format!(
            "expected folder section, got {nid:?}"
        )));
    }

    let num_folders = rd.read_number_usize()?;
    let external = rd.read_u8()?;
    if external != 0 {
        return Err(SjuzError::header_corrupt("external data is unsupported"));
    }

    let mut folders = Vec::with_capacity(num_folders.min(1024));
    for _ in 0..num_folders {
        folders.push(read_folder(rd)?);
    }

    let nid = PropertyId::read(rd)?;
    if nid != PropertyId::CodersUnpackSize {
        return Err(SjuzError::header_corrupt(format!(
            "expected coder output sizes, got {nid:?}"
        )));
    }

    for folder in &mut folders {
        let total_out = folder.total_out_streams();
        folder.unpack_sizes = (0..total_out)
            .map(|_| rd.read_number())
            .collect::<Result<_>>()?;
    }

    let mut nid = PropertyId::read(rd)?;

    if nid == PropertyId::Crc {
        let defined = rd.read_all_or_bits(num_folders)?;
        for (folder, &is_defined) in folders.iter_mut().zip(defined.iter()) {
            if is_defined {
                folder.crc = Some(rd.read_u32_le()?);
            }
        }
        nid = PropertyId::read(rd)?;
    }

    if nid != PropertyId::End {
        return Err(SjuzError::header_corrupt(format!(
            "badly terminated unpack info ({nid:?})"
        )));
    }

    Ok(folders)
}

fn read_folder(rd: &mut ByteReader<'_>) -> Result<Folder> {
    let num_coders = rd.read_number_usize()?;
    if num_coders == 0 {
        return Err(SjuzError::header_corrupt("folder without coders"));
    }

    let mut coders = Vec::with_capacity(num_coders.min(64));
    for _ in 0..num_coders {
        let flags = rd.read_u8()?;
        let id_size = (flags & 0x0F) as usize;
        let is_complex = flags & 0x10 != 0;
        let has_properties = flags & 0x20 != 0;
        if flags & 0x80 != 0 {
            return Err(SjuzError::header_corrupt(
                "alternative coder methods are unsupported",
            ));
        }

        let raw_id = rd.read_bytes(id_size)?.to_vec();

        let (num_in_streams, num_out_streams) = if is_complex {
            (rd.read_number()?, rd.read_number()?)
        } else {
            (1, 1)
        };

        let properties = if has_properties {
            let size = rd.read_number_usize()?;
            rd.read_bytes(size)?.to_vec()
        } else {
            Vec::new()
        };

        coders.push(Coder {
            method: MethodId::from_bytes(&raw_id),
            raw_id,
            num_in_streams,
            num_out_streams,
            properties,
        });
    }

    let total_in: u64 = coders.iter().map(|c| c.num_in_streams).sum();
    let total_out: u64 = coders.iter().map(|c| c.num_out_streams).sum();

    if total_out == 0 {
        return Err(SjuzError::header_corrupt("folder produces no output"));
    }

    let num_bind_pairs = total_out - 1;
    if total_in < num_bind_pairs {
        return Err(SjuzError::header_corrupt(
            "fewer input streams than bind pairs",
        ));
    }

    let mut bind_pairs = Vec::with_capacity(num_bind_pairs as usize);
    for _ in 0..num_bind_pairs {
        let pair = BindPair {
            in_index: rd.read_number()?,
            out_index: rd.read_number()?,
        };
        if pair.in_index >= total_in || pair.out_index >= total_out {
            return Err(SjuzError::header_corrupt("bind pair index out of range"));
        }
        bind_pairs.push(pair);
    }

    // Every stream may be wired at most once.
    for (i, a) in bind_pairs.iter().enumerate() {
        for b in &bind_pairs[..i] {
            if a.in_index == b.in_index || a.out_index == b.out_index {
                return Err(SjuzError::header_corrupt("duplicate bind pair stream"));
            }
        }
    }

    let num_packed = total_in - num_bind_pairs;
    let mut packed_streams = Vec::with_capacity(num_packed as usize);
    if num_packed == 1 {
        let unbound = (0..total_in)
            .find(|&i| !bind_pairs.iter().any(|bp| bp.in_index == i))
            .ok_or_else(|| SjuzError::header_corrupt("no unbound input stream"))?;
        packed_streams.push(unbound);
    } else {
        for _ in 0..num_packed {
            let index = rd.read_number()?;
            if index >= total_in {
                return Err(SjuzError::header_corrupt("packed stream index out of range"));
            }
            packed_streams.push(index);
        }
    }

    Ok(Folder {
        coders,
        bind_pairs,
        packed_streams,
        unpack_sizes: Vec::new(),
        crc: None,
        num_substreams: 1,
    })
}

fn read_substreams_info(
    rd: &mut ByteReader<'_>,
    folders: &mut [Folder],
) -> Result<SubStreamsInfo> {
    for folder in folders.iter_mut() {
        folder.num_substreams = 1;
    }

    let mut nid = PropertyId::read(rd)?;

    if nid == PropertyId::NumUnpackStream {
        for folder in folders.iter_mut() {
            folder.num_substreams = rd.read_number()?;
        }
        nid = PropertyId::read(rd)?;
    }

    // Sizes: explicit for all but the last substream of each folder, which
    // takes the remainder of the folder output.
    let mut sizes = Vec::new();
    for folder in folders.iter() {
        if folder.num_substreams == 0 {
            continue;
        }

        let mut explicit_sum = 0u64;
        if nid == PropertyId::Size {
            for _ in 0..folder.num_substreams - 1 {
                let size = rd.read_number()?;
                sizes.push(size);
                explicit_sum = explicit_sum
                    .checked_add(size)
                    .ok_or_else(|| SjuzError::header_corrupt("substream sizes overflow"))?;
            }
        } else if folder.num_substreams != 1 {
            return Err(SjuzError::header_corrupt(
                "substream split without a size section",
            ));
        }

        let remainder = folder
            .unpack_size()
            .checked_sub(explicit_sum)
            .ok_or_else(|| {
                SjuzError::header_corrupt("substream sizes exceed folder output")
            })?;
        sizes.push(remainder);
    }

    if nid == PropertyId::Size {
        nid = PropertyId::read(rd)?;
    }

    // Digests are stored only for substreams whose CRC is not already
    // implied by a single-substream folder CRC.
    let needs_digest =
        |folder: &Folder| folder.num_substreams != 1 || folder.crc.is_none();
    let num_digests: u64 = folders
        .iter()
        .filter(|f| needs_digest(f))
        .map(|f| f.num_substreams)
        .sum();

    let mut crcs = Vec::with_capacity(sizes.len());
    if nid == PropertyId::Crc {
        let defined = rd.read_all_or_bits(num_digests as usize)?;
        let mut digests = Vec::with_capacity(defined.len());
        for &is_defined in &defined {
            digests.push(if is_defined {
                Some(rd.read_u32_le()?)
            } else {
                None
            });
        }

        let mut next_digest = 0usize;
        for folder in folders.iter() {
            if needs_digest(folder) {
                for _ in 0..folder.num_substreams {
                    crcs.push(digests.get(next_digest).copied().flatten());
                    next_digest += 1;
                }
            } else {
                crcs.push(folder.crc);
            }
        }

        nid = PropertyId::read(rd)?;
    } else {
        for folder in folders.iter() {
            if needs_digest(folder) {
                crcs.extend(std::iter::repeat_n(None, folder.num_substreams as usize));
            } else {
                crcs.push(folder.crc);
            }
        }
    }

    if nid != PropertyId::End {
        return Err(SjuzError::header_corrupt(format!(
            "badly terminated substreams info ({nid:?})"
        )));
    }

    Ok(SubStreamsInfo { sizes, crcs })
}
