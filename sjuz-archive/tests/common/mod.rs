//! In-test archive builder.
//!
//! Writes real archive bytes from a logical plan: entries in table order,
//! data files grouped into folders, each folder packed with a chosen codec,
//! and the metadata block emitted either plain or LZMA-compressed (the
//! encoded-header form). Only what the tests exercise is supported.

use sjuz_core::crc::Crc32;
use sjuz_lzma::{LzmaProps, compress_raw, encode_lzma2, props_from_dict_size};

/// Fixture dictionary size for all LZMA coders.
const DICT_SIZE: u32 = 1 << 16;

/// An entry of the file table, in table order.
pub enum Entry {
    /// A directory (empty stream, no empty-file bit).
    Dir(&'static str),
    /// A zero-byte file (empty stream, empty-file bit).
    Empty(&'static str),
    /// A deletion marker.
    Anti(&'static str),
    /// A file with contents; consumes the next substream.
    Data(&'static str, Vec<u8>),
}

/// How a folder packs its payload.
pub enum Codec {
    /// Stored.
    Copy,
    /// Single LZMA coder.
    Lzma,
    /// Single LZMA2 coder.
    Lzma2,
    /// LZMA followed by a delta filter with the given distance.
    LzmaDelta(u8),
    /// An arbitrary coder ID; payload stored as-is (for unsupported-method
    /// tests).
    Raw(Vec<u8>),
}

/// One folder: a codec and how many data entries it holds.
pub struct FolderPlan {
    pub codec: Codec,
    pub num_files: usize,
}

/// The whole archive plan.
pub struct Plan {
    pub entries: Vec<Entry>,
    pub folders: Vec<FolderPlan>,
    /// Store the metadata block LZMA-compressed.
    pub encode_header: bool,
    /// Emit folder and substream CRCs.
    pub crcs: bool,
    /// An extra (unrecognized) section injected into the file table.
    pub extra_files_section: Option<(u8, Vec<u8>)>,
}

impl Plan {
    pub fn new(entries: Vec<Entry>, folders: Vec<FolderPlan>) -> Self {
        Self {
            entries,
            folders,
            encode_header: false,
            crcs: true,
            extra_files_section: None,
        }
    }
}

/// Build an archive holding `files`, one folder, plain header, CRCs on.
pub fn simple_archive(codec: Codec, files: &[(&'static str, &[u8])]) -> Vec<u8> {
    let entries = files
        .iter()
        .map(|(name, data)| Entry::Data(name, data.to_vec()))
        .collect();
    let folders = vec![FolderPlan {
        codec,
        num_files: files.len(),
    }];
    build(&Plan::new(entries, folders))
}

/// Encode a 7z variable-length number.
pub fn write_number(out: &mut Vec<u8>, value: u64) {
    if value < 0x80 {
        out.push(value as u8);
        return;
    }

    for extra in 1..8u32 {
        if value < 1u64 << (8 * extra + 7 - extra) {
            let mask = !(0xFFu8 >> extra);
            out.push(mask | (value >> (8 * extra)) as u8);
            out.extend_from_slice(&value.to_le_bytes()[..extra as usize]);
            return;
        }
    }

    out.push(0xFF);
    out.extend_from_slice(&value.to_le_bytes());
}

fn lzma_coder_properties() -> Vec<u8> {
    let mut props = vec![LzmaProps::default().to_byte()];
    props.extend_from_slice(&DICT_SIZE.to_le_bytes());
    props
}

/// A built folder, ready for the metadata writer.
struct BuiltFolder {
    packed: Vec<u8>,
    /// The folder structure bytes (coders, bind pairs).
    structure: Vec<u8>,
    /// Declared size per coder output stream.
    unpack_sizes: Vec<u64>,
    sub_sizes: Vec<u64>,
    sub_crcs: Vec<u32>,
    crc: u32,
}

fn coder_bytes(out: &mut Vec<u8>, id: &[u8], properties: Option<&[u8]>) {
    let mut flags = id.len() as u8;
    if properties.is_some() {
        flags |= 0x20;
    }
    out.push(flags);
    out.extend_from_slice(id);
    if let Some(props) = properties {
        write_number(out, props.len() as u64);
        out.extend_from_slice(props);
    }
}

fn build_folder(plan: &FolderPlan, files: &[(&str, Vec<u8>)]) -> BuiltFolder {
    let payload: Vec<u8> = files.iter().flat_map(|(_, d)| d.iter().copied()).collect();
    let size = payload.len() as u64;

    let mut structure = Vec::new();
    let (packed, unpack_sizes) = match &plan.codec {
        Codec::Copy => {
            write_number(&mut structure, 1);
            coder_bytes(&mut structure, &[0x00], None);
            (payload.clone(), vec![size])
        }
        Codec::Lzma => {
            write_number(&mut structure, 1);
            coder_bytes(&mut structure, &[0x03, 0x01, 0x01], Some(&lzma_coder_properties()));
            (compress_raw(&payload, DICT_SIZE), vec![size])
        }
        Codec::Lzma2 => {
            write_number(&mut structure, 1);
            coder_bytes(&mut structure, &[0x21], Some(&[props_from_dict_size(DICT_SIZE)]));
            (encode_lzma2(&payload), vec![size])
        }
        Codec::LzmaDelta(distance) => {
            // Coder 0: LZMA, coder 1: delta fed by coder 0's output.
            write_number(&mut structure, 2);
            coder_bytes(&mut structure, &[0x03, 0x01, 0x01], Some(&lzma_coder_properties()));
            coder_bytes(&mut structure, &[0x03], Some(&[distance - 1]));
            // Bind pair: input stream 1 <- output stream 0.
            write_number(&mut structure, 1);
            write_number(&mut structure, 0);

            let mut filtered = payload.clone();
            delta_encode(&mut filtered, *distance as usize);
            (compress_raw(&filtered, DICT_SIZE), vec![size, size])
        }
        Codec::Raw(id) => {
            write_number(&mut structure, 1);
            coder_bytes(&mut structure, id, None);
            (payload.clone(), vec![size])
        }
    };

    BuiltFolder {
        packed,
        structure,
        unpack_sizes,
        sub_sizes: files.iter().map(|(_, d)| d.len() as u64).collect(),
        sub_crcs: files.iter().map(|(_, d)| Crc32::compute(d)).collect(),
        crc: Crc32::compute(&payload),
    }
}

/// The inverse of the delta decode filter, for chained-coder fixtures.
fn delta_encode(data: &mut [u8], distance: usize) {
    for i in (distance..data.len()).rev() {
        data[i] = data[i].wrapping_sub(data[i - distance]);
    }
}

fn bitmap(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            out[i / 8] |= 0x80 >> (i % 8);
        }
    }
    out
}

fn streams_info_bytes(out: &mut Vec<u8>, pack_pos: u64, folders: &[BuiltFolder], plan: &Plan) {
    // PackInfo
    out.push(0x06);
    write_number(out, pack_pos);
    write_number(out, folders.len() as u64);
    out.push(0x09);
    for folder in folders {
        write_number(out, folder.packed.len() as u64);
    }
    out.push(0x00);

    // UnpackInfo
    out.push(0x07);
    out.push(0x0B);
    write_number(out, folders.len() as u64);
    out.push(0x00);
    for folder in folders {
        out.extend_from_slice(&folder.structure);
    }
    out.push(0x0C);
    for folder in folders {
        for &size in &folder.unpack_sizes {
            write_number(out, size);
        }
    }
    if plan.crcs {
        out.push(0x0A);
        out.push(0x01);
        for folder in folders {
            out.extend_from_slice(&folder.crc.to_le_bytes());
        }
    }
    out.push(0x00);

    // SubStreamsInfo
    let any_split = folders.iter().any(|f| f.sub_sizes.len() != 1);
    if any_split || plan.crcs {
        out.push(0x08);
        if any_split {
            out.push(0x0D);
            for folder in folders {
                write_number(out, folder.sub_sizes.len() as u64);
            }
            out.push(0x09);
            for folder in folders {
                for &size in &folder.sub_sizes[..folder.sub_sizes.len() - 1] {
                    write_number(out, size);
                }
            }
        }
        if plan.crcs {
            // Digests only for substreams not covered by a folder CRC.
            let digests: Vec<u32> = folders
                .iter()
                .filter(|f| f.sub_sizes.len() != 1)
                .flat_map(|f| f.sub_crcs.iter().copied())
                .collect();
            if !digests.is_empty() {
                out.push(0x0A);
                out.push(0x01);
                for crc in digests {
                    out.extend_from_slice(&crc.to_le_bytes());
                }
            }
        }
        out.push(0x00);
    }

    out.push(0x00);
}

fn files_info_bytes(out: &mut Vec<u8>, plan: &Plan) {
    out.push(0x05);
    write_number(out, plan.entries.len() as u64);

    let empty_stream: Vec<bool> = plan
        .entries
        .iter()
        .map(|e| !matches!(e, Entry::Data(..)))
        .collect();

    if empty_stream.iter().any(|&b| b) {
        let bits = bitmap(&empty_stream);
        out.push(0x0E);
        write_number(out, bits.len() as u64);
        out.extend_from_slice(&bits);

        let empty_entries: Vec<&Entry> = plan
            .entries
            .iter()
            .filter(|e| !matches!(e, Entry::Data(..)))
            .collect();

        let empty_file: Vec<bool> = empty_entries
            .iter()
            .map(|e| matches!(e, Entry::Empty(_)))
            .collect();
        if empty_file.iter().any(|&b| b) {
            let bits = bitmap(&empty_file);
            out.push(0x0F);
            write_number(out, bits.len() as u64);
            out.extend_from_slice(&bits);
        }

        let anti: Vec<bool> = empty_entries
            .iter()
            .map(|e| matches!(e, Entry::Anti(_)))
            .collect();
        if anti.iter().any(|&b| b) {
            let bits = bitmap(&anti);
            out.push(0x10);
            write_number(out, bits.len() as u64);
            out.extend_from_slice(&bits);
        }
    }

    if let Some((id, payload)) = &plan.extra_files_section {
        out.push(*id);
        write_number(out, payload.len() as u64);
        out.extend_from_slice(payload);
    }

    let mut names = vec![0x00u8];
    for entry in &plan.entries {
        let name = match entry {
            Entry::Dir(n) | Entry::Empty(n) | Entry::Anti(n) | Entry::Data(n, _) => n,
        };
        for unit in name.encode_utf16() {
            names.extend_from_slice(&unit.to_le_bytes());
        }
        names.extend_from_slice(&[0, 0]);
    }
    out.push(0x11);
    write_number(out, names.len() as u64);
    out.extend_from_slice(&names);

    out.push(0x00);
}

/// Wrap a plain header into its encoded (LZMA-compressed) form.
fn encoded_header_bytes(header: &[u8], pack_pos: u64) -> (Vec<u8>, Vec<u8>) {
    let packed = compress_raw(header, DICT_SIZE);

    let mut out = vec![0x17];

    out.push(0x06);
    write_number(&mut out, pack_pos);
    write_number(&mut out, 1);
    out.push(0x09);
    write_number(&mut out, packed.len() as u64);
    out.push(0x00);

    out.push(0x07);
    out.push(0x0B);
    write_number(&mut out, 1);
    out.push(0x00);
    write_number(&mut out, 1);
    coder_bytes(&mut out, &[0x03, 0x01, 0x01], Some(&lzma_coder_properties()));
    out.push(0x0C);
    write_number(&mut out, header.len() as u64);
    out.push(0x0A);
    out.push(0x01);
    out.extend_from_slice(&Crc32::compute(header).to_le_bytes());
    out.push(0x00);

    out.push(0x00);

    (out, packed)
}

/// Build the archive bytes for `plan`.
pub fn build(plan: &Plan) -> Vec<u8> {
    let data_entries: Vec<(&str, Vec<u8>)> = plan
        .entries
        .iter()
        .filter_map(|e| match e {
            Entry::Data(name, data) => Some((*name, data.clone())),
            _ => None,
        })
        .collect();

    let mut built = Vec::new();
    let mut next_file = 0usize;
    for folder_plan in &plan.folders {
        let files = &data_entries[next_file..next_file + folder_plan.num_files];
        next_file += folder_plan.num_files;
        built.push(build_folder(folder_plan, files));
    }
    assert_eq!(next_file, data_entries.len(), "folder plan must cover all data entries");

    let mut pack_area: Vec<u8> = Vec::new();
    for folder in &built {
        pack_area.extend_from_slice(&folder.packed);
    }

    let mut header = vec![0x01];
    if !built.is_empty() {
        header.push(0x04);
        streams_info_bytes(&mut header, 0, &built, plan);
    }
    files_info_bytes(&mut header, plan);
    header.push(0x00);

    let next_header = if plan.encode_header {
        let (outer, packed_header) = encoded_header_bytes(&header, pack_area.len() as u64);
        pack_area.extend_from_slice(&packed_header);
        outer
    } else {
        header
    };

    assemble(&pack_area, &next_header)
}

/// Signature header + pack area + metadata block.
pub fn assemble(pack_area: &[u8], next_header: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]);
    out.extend_from_slice(&[0x00, 0x04]);

    let mut tail = Vec::with_capacity(20);
    tail.extend_from_slice(&(pack_area.len() as u64).to_le_bytes());
    tail.extend_from_slice(&(next_header.len() as u64).to_le_bytes());
    tail.extend_from_slice(&Crc32::compute(next_header).to_le_bytes());

    out.extend_from_slice(&Crc32::compute(&tail).to_le_bytes());
    out.extend_from_slice(&tail);
    out.extend_from_slice(pack_area);
    out.extend_from_slice(next_header);
    out
}
