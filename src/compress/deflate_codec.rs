use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use super::{Algorithm, Codec, CompressError};

pub struct DeflateCodec;

impl Codec for DeflateCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Deflate
    }

    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CompressError> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level as u32));
        encoder
            .write_all(data)
            .map_err(|e| CompressError::Compression(e.to_string()))?;
        encoder.finish().map_err(|e| CompressError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressError> {
        let mut decoder = DeflateDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CompressError::Decompression(e.to_string()))?;
        Ok(out)
    }
}
