//! Whole-archive decoding.
//!
//! One call turns a complete archive byte sequence into the logical
//! directory it stores: signature header, metadata block (decompressing it
//! first when it is stored as an encoded header), folder decode, substream
//! slicing, checksum verification. Decoding owns no state across calls;
//! every decode is a pure function of its input bytes.

use crate::codec;
use crate::files::{FileEntry, read_files_info};
use crate::property::PropertyId;
use crate::signature::{SIGNATURE_HEADER_LEN, next_header_bytes, parse_signature_header};
use crate::streams::{Folder, PackInfo, StreamsInfo, read_streams_info};
use sjuz_core::crc::Crc32;
use sjuz_core::error::{Result, SjuzError};
use sjuz_core::reader::ByteReader;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// How many levels of encoded-header nesting are accepted.
const MAX_HEADER_NESTING: usize = 8;

/// One extracted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    /// Path within the archive.
    pub name: String,
    /// Decompressed contents.
    pub data: Vec<u8>,
    /// False when a stored checksum for this file failed verification; the
    /// bytes are still returned.
    pub crc_ok: bool,
}

/// The decoded archive.
#[derive(Debug, Clone)]
pub struct Archive {
    /// Content-derived identifier: CRC-32 of the input, as 8 hex digits.
    pub id: String,
    /// Non-directory entries in file-table order.
    pub files: Vec<ArchiveFile>,
}

/// Decode a complete archive.
pub fn decompress(data: &[u8]) -> Result<Archive> {
    let start = parse_signature_header(data)?;
    let id = format!("{:08x}", Crc32::compute(data));

    let header = next_header_bytes(data, &start)?;
    if header.is_empty() {
        return Ok(Archive {
            id,
            files: Vec::new(),
        });
    }

    enum Step {
        Done((Option<StreamsInfo>, Vec<FileEntry>)),
        Unpacked(Vec<u8>),
    }

    let mut header_buf = header.to_vec();
    let mut nesting = 0usize;

    let (streams, files) = loop {
        let step = {
            let mut rd = ByteReader::new(&header_buf);
            match PropertyId::read(&mut rd)? {
                PropertyId::Header => Step::Done(read_header_body(&mut rd)?),
                PropertyId::EncodedHeader => Step::Unpacked(decode_packed_header(data, &mut rd)?),
                other => {
                    return Err(SjuzError::header_corrupt(format!(
                        "unexpected header tag {other:?}"
                    )));
                }
            }
        };

        match step {
            Step::Done(parsed) => break parsed,
            Step::Unpacked(buf) => {
                nesting += 1;
                if nesting > MAX_HEADER_NESTING {
                    return Err(SjuzError::header_corrupt("header nesting too deep"));
                }
                header_buf = buf;
            }
        }
    };

    let files = match streams {
        Some(streams) => extract_files(data, &streams, &files)?,
        None => {
            if files.iter().any(|f| f.has_stream) {
                return Err(SjuzError::model_inconsistent(
                    "file table declares streams but no streams info is present",
                ));
            }
            files
                .iter()
                .filter(|f| !f.is_directory && !f.is_anti)
                .map(|f| ArchiveFile {
                    name: f.name.clone(),
                    data: Vec::new(),
                    crc_ok: true,
                })
                .collect()
        }
    };

    Ok(Archive { id, files })
}

/// Parse the body of a plain `Header` (tag already consumed).
fn read_header_body(
    rd: &mut ByteReader<'_>,
) -> Result<(Option<StreamsInfo>, Vec<FileEntry>)> {
    let mut nid = PropertyId::read(rd)?;

    if nid == PropertyId::ArchiveProperties {
        skip_archive_properties(rd)?;
        nid = PropertyId::read(rd)?;
    }

    if nid == PropertyId::AdditionalStreamsInfo {
        return Err(SjuzError::header_corrupt(
            "additional streams are unsupported",
        ));
    }

    let mut streams = None;
    if nid == PropertyId::MainStreamsInfo {
        streams = Some(read_streams_info(rd)?);
        nid = PropertyId::read(rd)?;
    }

    let mut files = Vec::new();
    if nid == PropertyId::FilesInfo {
        files = read_files_info(rd)?;
        nid = PropertyId::read(rd)?;
    }

    if nid != PropertyId::End {
        return Err(SjuzError::header_corrupt(format!(
            "badly terminated header ({nid:?})"
        )));
    }

    Ok((streams, files))
}

/// Skip the `ArchiveProperties` section: length-prefixed entries until End.
fn skip_archive_properties(rd: &mut ByteReader<'_>) -> Result<()> {
    loop {
        if PropertyId::read(rd)? == PropertyId::End {
            return Ok(());
        }
        let size = rd.read_number_usize()?;
        rd.skip(size)?;
    }
}

/// Decompress an encoded header: its streams info describes one folder whose
/// output is the real metadata block.
fn decode_packed_header(archive: &[u8], rd: &mut ByteReader<'_>) -> Result<Vec<u8>> {
    let streams = read_streams_info(rd)?;
    let folder = streams
        .folders
        .first()
        .ok_or_else(|| SjuzError::header_corrupt("encoded header without a folder"))?;

    let packed = packed_slice(archive, &streams.pack_info, &streams.folders, 0)?;
    let out = codec::decode_folder(folder, packed)?;

    if let Some(crc) = folder.crc {
        let computed = Crc32::compute(&out);
        if computed != crc {
            return Err(SjuzError::header_corrupt(format!(
                "encoded header checksum mismatch: stored {crc:#010x}, computed {computed:#010x}"
            )));
        }
    }

    Ok(out)
}

/// Index of the first packed stream belonging to `folder_index`.
fn first_pack_index(folders: &[Folder], folder_index: usize) -> usize {
    folders[..folder_index]
        .iter()
        .map(|f| f.packed_streams.len())
        .sum()
}

/// Slice a folder's packed bytes out of the archive.
fn packed_slice<'a>(
    archive: &'a [u8],
    pack_info: &PackInfo,
    folders: &[Folder],
    folder_index: usize,
) -> Result<&'a [u8]> {
    let first = first_pack_index(folders, folder_index);

    let mut offset = SIGNATURE_HEADER_LEN as u64 + pack_info.pack_pos;
    for size in &pack_info.pack_sizes[..first] {
        offset = offset
            .checked_add(*size)
            .ok_or_else(|| SjuzError::header_corrupt("packed stream offsets overflow"))?;
    }

    let size = *pack_info
        .pack_sizes
        .get(first)
        .ok_or_else(|| SjuzError::header_corrupt("packed stream index out of range"))?;

    let begin = usize::try_from(offset)
        .map_err(|_| SjuzError::header_corrupt("packed stream offset exceeds address space"))?;
    let end = usize::try_from(offset + size)
        .map_err(|_| SjuzError::header_corrupt("packed stream range exceeds address space"))?;

    if end > archive.len() {
        return Err(SjuzError::truncated(end - archive.len()));
    }

    Ok(&archive[begin..end])
}

/// Decode every folder (in parallel when the `parallel` feature is on).
fn decode_folders(archive: &[u8], streams: &StreamsInfo) -> Result<Vec<Vec<u8>>> {
    let decode_one = |index: usize, folder: &Folder| -> Result<Vec<u8>> {
        let packed = packed_slice(archive, &streams.pack_info, &streams.folders, index)?;
        codec::decode_folder(folder, packed)
    };

    #[cfg(feature = "parallel")]
    {
        streams
            .folders
            .par_iter()
            .enumerate()
            .map(|(i, f)| decode_one(i, f))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        streams
            .folders
            .iter()
            .enumerate()
            .map(|(i, f)| decode_one(i, f))
            .collect()
    }
}

/// Decode folders and slice the file table's substreams out of them.
fn extract_files(
    archive: &[u8],
    streams: &StreamsInfo,
    files: &[FileEntry],
) -> Result<Vec<ArchiveFile>> {
    let stream_bearing = files.iter().filter(|f| f.has_stream).count();
    if stream_bearing != streams.substreams.sizes.len() {
        return Err(SjuzError::model_inconsistent(format!(
            "{} stream-bearing files for {} substreams",
            stream_bearing,
            streams.substreams.sizes.len()
        )));
    }

    let outputs = decode_folders(archive, streams)?;

    // A folder is tainted when a stored packed-stream or whole-folder CRC
    // fails: its files are returned but flagged.
    let mut folder_ok = vec![true; streams.folders.len()];
    for (index, folder) in streams.folders.iter().enumerate() {
        let first = first_pack_index(&streams.folders, index);
        if let Some(Some(crc)) = streams.pack_info.pack_crcs.get(first) {
            let packed = packed_slice(archive, &streams.pack_info, &streams.folders, index)?;
            if Crc32::compute(packed) != *crc {
                folder_ok[index] = false;
            }
        }
        if let Some(crc) = folder.crc {
            if Crc32::compute(&outputs[index]) != crc {
                folder_ok[index] = false;
            }
        }
    }

    let mut results = Vec::new();
    let mut folder_index = 0usize;
    let mut used_substreams = 0u64;
    let mut offset = 0usize;
    let mut substream = 0usize;

    for file in files {
        if !file.has_stream {
            // Zero-byte files appear in the result; directories and
            // deletion markers do not.
            if !file.is_directory && !file.is_anti {
                results.push(ArchiveFile {
                    name: file.name.clone(),
                    data: Vec::new(),
                    crc_ok: true,
                });
            }
            continue;
        }

        while folder_index < streams.folders.len()
            && used_substreams == streams.folders[folder_index].num_substreams
        {
            folder_index += 1;
            used_substreams = 0;
            offset = 0;
        }
        if folder_index >= streams.folders.len() {
            return Err(SjuzError::model_inconsistent("too few folders for files"));
        }

        let size = usize::try_from(streams.substreams.sizes[substream])
            .map_err(|_| SjuzError::header_corrupt("substream size exceeds address space"))?;
        let output = &outputs[folder_index];
        if offset + size > output.len() {
            return Err(SjuzError::size_mismatch(
                (offset + size) as u64,
                output.len() as u64,
            ));
        }

        let data = output[offset..offset + size].to_vec();
        // A per-file digest is authoritative; without one the file inherits
        // the folder-level verdict (packed-stream and whole-folder CRCs).
        let crc_ok = match streams.substreams.crcs[substream] {
            Some(crc) => Crc32::compute(&data) == crc,
            None => folder_ok[folder_index],
        };

        results.push(ArchiveFile {
            name: file.name.clone(),
            data,
            crc_ok,
        });

        offset += size;
        used_substreams += 1;
        substream += 1;
    }

    Ok(results)
}
