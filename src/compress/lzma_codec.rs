use std::io::Cursor;

use super::{Algorithm, Codec, CompressError};

/// `lzma-rs` exposes no level/dictionary-size knob; every level 1–9
/// compresses through the same single preset. The level is still
/// validated against the algorithm's 1–9 range for API symmetry with
/// the other codecs and so callers can record a level in archive
/// metadata without a special case.
pub struct LzmaCodec;

impl Codec for LzmaCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Lzma
    }

    fn compress(&self, data: &[u8], _level: i32) -> Result<Vec<u8>, CompressError> {
        let mut out = Vec::new();
        lzma_rs::lzma_compress(&mut Cursor::new(data), &mut out)
            .map_err(|e| CompressError::Compression(e.to_string()))?;
        Ok(out)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressError> {
        let mut out = Vec::new();
        lzma_rs::lzma_decompress(&mut Cursor::new(data), &mut out)
            .map_err(|e| CompressError::Decompression(e.to_string()))?;
        Ok(out)
    }
}
