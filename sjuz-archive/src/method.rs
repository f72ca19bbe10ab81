//! Coder method identifiers.
//!
//! A coder names its algorithm with an opaque byte string of up to 15
//! bytes. The identifiers this decoder implements are mapped to variants;
//! everything else stays [`MethodId::Unknown`] with the raw bytes preserved
//! so an `UnsupportedCodec` report can name the method precisely.

/// A compression/filter method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodId {
    /// No transformation (stored).
    Copy,
    /// LZMA.
    Lzma,
    /// LZMA2.
    Lzma2,
    /// Byte-wise delta filter.
    Delta,
    /// x86 branch/call target filter.
    BcjX86,
    /// Anything this decoder does not implement.
    Unknown(Vec<u8>),
}

impl MethodId {
    /// Map raw method identifier bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match bytes {
            [0x00] => Self::Copy,
            [0x03, 0x01, 0x01] => Self::Lzma,
            [0x21] => Self::Lzma2,
            [0x03] => Self::Delta,
            [0x03, 0x03, 0x01, 0x03] => Self::BcjX86,
            _ => Self::Unknown(bytes.to_vec()),
        }
    }
}
