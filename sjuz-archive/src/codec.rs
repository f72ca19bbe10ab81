//! Per-folder codec dispatch.
//!
//! A folder's coders run in chain order, each stage consuming the previous
//! stage's output in full. Every stage's output length is checked against
//! the size the metadata declared for that coder; the final stage's check is
//! therefore also the folder-level size check.

use crate::filters;
use crate::method::MethodId;
use crate::streams::{Coder, Folder};
use sjuz_core::error::{Result, SjuzError};
use sjuz_lzma::{Lzma2Decoder, LzmaProps};

/// Decode a folder's packed bytes into its declared output.
pub fn decode_folder(folder: &Folder, packed: &[u8]) -> Result<Vec<u8>> {
    let order = folder.ordered_coders()?;

    let mut data = packed.to_vec();
    for &coder_index in &order {
        let coder = &folder.coders[coder_index];
        let declared = folder.coder_unpack_size(coder_index)?;

        data = run_coder(coder, data, declared)?;

        if data.len() as u64 != declared {
            return Err(SjuzError::size_mismatch(declared, data.len() as u64));
        }
    }

    Ok(data)
}

/// Run one coder stage.
fn run_coder(coder: &Coder, input: Vec<u8>, declared_out: u64) -> Result<Vec<u8>> {
    match &coder.method {
        MethodId::Copy => Ok(input),
        MethodId::Lzma => {
            let props = lzma_props(&coder.properties)?;
            sjuz_lzma::decompress_raw(input.as_slice(), props, declared_out)
        }
        MethodId::Lzma2 => {
            let &props_byte = coder
                .properties
                .first()
                .ok_or_else(|| SjuzError::header_corrupt("missing LZMA2 properties"))?;
            if sjuz_lzma::dict_size_from_props(props_byte).is_none() {
                return Err(SjuzError::header_corrupt(format!(
                    "invalid LZMA2 dictionary properties byte {props_byte}"
                )));
            }

            let mut reader = input.as_slice();
            Lzma2Decoder::new().decode(&mut reader)
        }
        MethodId::Delta => {
            // Stored distance is the real distance minus one.
            let distance = coder.properties.first().map_or(1, |&b| b as usize + 1);
            let mut data = input;
            filters::delta_decode(&mut data, distance);
            Ok(data)
        }
        MethodId::BcjX86 => {
            let mut data = input;
            filters::x86_convert(&mut data, 0, false);
            Ok(data)
        }
        MethodId::Unknown(id) => Err(SjuzError::unsupported_codec(id)),
    }
}

/// Extract the LZMA properties (lc/lp/pb byte + dictionary size) from a
/// coder's properties blob.
fn lzma_props(blob: &[u8]) -> Result<LzmaProps> {
    if blob.len() < 5 {
        return Err(SjuzError::header_corrupt("short LZMA properties blob"));
    }

    LzmaProps::from_byte(blob[0])
        .ok_or_else(|| SjuzError::header_corrupt(format!("invalid LZMA properties byte {}", blob[0])))
}
