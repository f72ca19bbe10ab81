//! Property IDs of the 7z metadata format.
//!
//! The metadata block is a sequence of tagged sections, each introduced by a
//! single-byte property ID. The format is forward-extensible: IDs this
//! decoder does not know map to [`PropertyId::Unknown`] and, where the
//! section carries a length prefix, are skipped rather than rejected.

use sjuz_core::error::Result;
use sjuz_core::reader::ByteReader;

/// A metadata section tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyId {
    /// Terminates the enclosing section list.
    End,
    /// Top-level plain header.
    Header,
    /// Global archive properties (skippable).
    ArchiveProperties,
    /// Additional streams (not supported).
    AdditionalStreamsInfo,
    /// The main streams description.
    MainStreamsInfo,
    /// The file table.
    FilesInfo,
    /// Packed stream positions and sizes.
    PackInfo,
    /// Folder/coder descriptions.
    UnpackInfo,
    /// Per-folder substream layout.
    SubStreamsInfo,
    /// A size list within the enclosing section.
    Size,
    /// A CRC list within the enclosing section.
    Crc,
    /// Folder definitions.
    Folder,
    /// Per-coder output sizes.
    CodersUnpackSize,
    /// Substream counts per folder.
    NumUnpackStream,
    /// Bitmap of entries without a data stream.
    EmptyStream,
    /// Bitmap of zero-byte files among the empty entries.
    EmptyFile,
    /// Bitmap of deletion markers among the empty entries.
    Anti,
    /// File name table.
    Name,
    /// Creation times.
    CTime,
    /// Access times.
    ATime,
    /// Modification times.
    MTime,
    /// Windows attribute words.
    WinAttributes,
    /// Archive comment.
    Comment,
    /// The header itself, stored compressed.
    EncodedHeader,
    /// Stream start positions (not supported).
    StartPos,
    /// Alignment padding.
    Dummy,
    /// Any ID this decoder does not recognize.
    Unknown(u8),
}

impl PropertyId {
    /// Map a raw tag byte.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::End,
            0x01 => Self::Header,
            0x02 => Self::ArchiveProperties,
            0x03 => Self::AdditionalStreamsInfo,
            0x04 => Self::MainStreamsInfo,
            0x05 => Self::FilesInfo,
            0x06 => Self::PackInfo,
            0x07 => Self::UnpackInfo,
            0x08 => Self::SubStreamsInfo,
            0x09 => Self::Size,
            0x0A => Self::Crc,
            0x0B => Self::Folder,
            0x0C => Self::CodersUnpackSize,
            0x0D => Self::NumUnpackStream,
            0x0E => Self::EmptyStream,
            0x0F => Self::EmptyFile,
            0x10 => Self::Anti,
            0x11 => Self::Name,
            0x12 => Self::CTime,
            0x13 => Self::ATime,
            0x14 => Self::MTime,
            0x15 => Self::WinAttributes,
            0x16 => Self::Comment,
            0x17 => Self::EncodedHeader,
            0x18 => Self::StartPos,
            0x19 => Self::Dummy,
            other => Self::Unknown(other),
        }
    }

    /// Read the next tag byte.
    pub fn read(rd: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self::from_u8(rd.read_u8()?))
    }
}
