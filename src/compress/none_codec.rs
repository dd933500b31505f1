use super::{Algorithm, Codec, CompressError};

pub struct NoneCodec;

impl Codec for NoneCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::None
    }
    fn compress(&self, data: &[u8], _level: i32) -> Result<Vec<u8>, CompressError> {
        Ok(data.to_vec())
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressError> {
        Ok(data.to_vec())
    }
}
