//! File table parsing.
//!
//! `FilesInfo` is a list of length-prefixed sections over a declared number
//! of entries: a name table (NUL-terminated UTF-16LE), bitmaps separating
//! stream-bearing files from empty entries (and empty entries into
//! zero-byte files, directories, and deletion markers), plus optional
//! timestamps and attribute words. Sections this decoder does not recognize
//! are skipped by their declared length; the format is forward-extensible.

use crate::property::PropertyId;
use sjuz_core::error::{Result, SjuzError};
use sjuz_core::reader::ByteReader;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// One entry of the file table.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path within the archive, `/`-separated as stored.
    pub name: String,
    /// Whether the entry consumes a substream.
    pub has_stream: bool,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Whether the entry is a deletion marker.
    pub is_anti: bool,
    /// Creation time, when stored.
    pub created: Option<SystemTime>,
    /// Access time, when stored.
    pub accessed: Option<SystemTime>,
    /// Modification time, when stored.
    pub modified: Option<SystemTime>,
    /// Windows attribute word, when stored.
    pub attributes: Option<u32>,
}

/// Parse a `FilesInfo` section (the tag byte already consumed).
pub fn read_files_info(rd: &mut ByteReader<'_>) -> Result<Vec<FileEntry>> {
    let num_files = rd.read_number_usize()?;

    let mut empty_stream = vec![false; num_files];
    let mut empty_file: Option<Vec<bool>> = None;
    let mut anti: Option<Vec<bool>> = None;
    let mut names: Vec<String> = Vec::new();
    let mut created: Vec<Option<SystemTime>> = vec![None; num_files];
    let mut accessed: Vec<Option<SystemTime>> = vec![None; num_files];
    let mut modified: Vec<Option<SystemTime>> = vec![None; num_files];
    let mut attributes: Vec<Option<u32>> = vec![None; num_files];

    loop {
        let id = PropertyId::read(rd)?;
        if id == PropertyId::End {
            break;
        }

        let size = rd.read_number_usize()?;
        if size > rd.remaining() {
            return Err(SjuzError::truncated(size - rd.remaining()));
        }
        let section_end = rd.position() + size;

        match id {
            PropertyId::EmptyStream => {
                empty_stream = rd.read_bit_vec(num_files)?;
            }
            PropertyId::EmptyFile => {
                let count = empty_stream.iter().filter(|&&e| e).count();
                empty_file = Some(rd.read_bit_vec(count)?);
            }
            PropertyId::Anti => {
                let count = empty_stream.iter().filter(|&&e| e).count();
                anti = Some(rd.read_bit_vec(count)?);
            }
            PropertyId::Name => {
                names = read_names(rd, size)?;
                if names.len() != num_files {
                    return Err(SjuzError::model_inconsistent(format!(
                        "name table holds {} entries for {num_files} files",
                        names.len()
                    )));
                }
            }
            PropertyId::CTime => read_times(rd, &mut created)?,
            PropertyId::ATime => read_times(rd, &mut accessed)?,
            PropertyId::MTime => read_times(rd, &mut modified)?,
            PropertyId::WinAttributes => read_attributes(rd, &mut attributes)?,
            PropertyId::StartPos => {
                return Err(SjuzError::header_corrupt(
                    "stream start positions are unsupported",
                ));
            }
            // Dummy padding and any unrecognized section: skip by length.
            _ => {}
        }

        rd.seek(section_end)?;
    }

    if names.len() != num_files {
        return Err(SjuzError::model_inconsistent(format!(
            "file table declares {num_files} entries but names {} of them",
            names.len()
        )));
    }

    let mut entries = Vec::with_capacity(num_files);
    let mut empty_index = 0usize;

    for (i, name) in names.into_iter().enumerate() {
        if !empty_stream[i] {
            entries.push(FileEntry {
                name,
                has_stream: true,
                is_directory: false,
                is_anti: false,
                created: created[i],
                accessed: accessed[i],
                modified: modified[i],
                attributes: attributes[i],
            });
        } else {
            // An empty entry is a directory unless the empty-file bitmap
            // marks it as a zero-byte file.
            let is_zero_byte_file = empty_file
                .as_ref()
                .is_some_and(|bits| bits.get(empty_index).copied().unwrap_or(false));
            let is_anti = anti
                .as_ref()
                .is_some_and(|bits| bits.get(empty_index).copied().unwrap_or(false));

            entries.push(FileEntry {
                name,
                has_stream: false,
                is_directory: !is_zero_byte_file && !is_anti,
                is_anti,
                created: created[i],
                accessed: accessed[i],
                modified: modified[i],
                attributes: attributes[i],
            });
            empty_index += 1;
        }
    }

    Ok(entries)
}

fn reject_external(rd: &mut ByteReader<'_>) -> Result<()> {
    if rd.read_u8()? != 0 {
        return Err(SjuzError::header_corrupt("external data is unsupported"));
    }
    Ok(())
}

/// Parse the name table: NUL-terminated UTF-16LE strings, back to back.
fn read_names(rd: &mut ByteReader<'_>, section_size: usize) -> Result<Vec<String>> {
    if section_size == 0 {
        return Err(SjuzError::header_corrupt("empty file name section"));
    }
    reject_external(rd)?;

    let data_len = section_size - 1;
    if data_len % 2 != 0 {
        return Err(SjuzError::header_corrupt("odd-sized file name table"));
    }
    let data = rd.read_bytes(data_len)?;

    let mut names = Vec::new();
    let mut units: Vec<u16> = Vec::new();
    for pair in data.chunks_exact(2) {
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        if unit == 0 {
            names.push(String::from_utf16_lossy(&units));
            units.clear();
        } else {
            units.push(unit);
        }
    }

    if !units.is_empty() {
        return Err(SjuzError::header_corrupt("unterminated file name"));
    }

    Ok(names)
}

/// Windows FILETIME epoch (1601-01-01) as 100ns ticks before the Unix epoch.
const FILETIME_UNIX_DIFF: u64 = 116_444_736_000_000_000;

fn filetime_to_system_time(filetime: u64) -> Option<SystemTime> {
    let unix_ticks = filetime.checked_sub(FILETIME_UNIX_DIFF)?;
    let secs = unix_ticks / 10_000_000;
    let nanos = (unix_ticks % 10_000_000) as u32 * 100;
    Some(UNIX_EPOCH + Duration::new(secs, nanos))
}

fn read_times(rd: &mut ByteReader<'_>, out: &mut [Option<SystemTime>]) -> Result<()> {
    let defined = rd.read_all_or_bits(out.len())?;
    reject_external(rd)?;

    for (slot, &is_defined) in out.iter_mut().zip(defined.iter()) {
        if is_defined {
            *slot = filetime_to_system_time(rd.read_u64_le()?);
        }
    }
    Ok(())
}

fn read_attributes(rd: &mut ByteReader<'_>, out: &mut [Option<u32>]) -> Result<()> {
    let defined = rd.read_all_or_bits(out.len())?;
    reject_external(rd)?;

    for (slot, &is_defined) in out.iter_mut().zip(defined.iter()) {
        if is_defined {
            *slot = Some(rd.read_u32_le()?);
        }
    }
    Ok(())
}
