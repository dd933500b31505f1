use std::io::{Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;

use super::{Algorithm, Codec, CompressError};

pub struct Bzip2Codec;

impl Codec for Bzip2Codec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Bzip2
    }

    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CompressError> {
        let mut encoder = BzEncoder::new(Vec::new(), Compression::new(level as u32));
        encoder
            .write_all(data)
            .map_err(|e| CompressError::Compression(e.to_string()))?;
        encoder.finish().map_err(|e| CompressError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressError> {
        let mut decoder = BzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CompressError::Decompression(e.to_string()))?;
        Ok(out)
    }
}
