//! Compression pipeline: an optional delta stage followed by a byte-level
//! codec, applied to raw file bytes *before* encryption (see `crypt`).
//!
//! Shaped after `sixcy::codec`'s registry: a small `Codec` trait with
//! one implementation per algorithm and a factory function, except the
//! algorithm set here is a fixed deflate/bzip2/lzma/none set rather
//! than `sixcy::codec`'s zstd/lz4/brotli set.

use thiserror::Error;

pub mod delta;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("compression error: {0}")]
    Compression(String),
    #[error("decompression error: {0}")]
    Decompression(String),
    #[error("unsupported level {level} for algorithm {algorithm:?}")]
    UnsupportedLevel { algorithm: Algorithm, level: i32 },
}

/// The byte-stage compression algorithm. `None` is a valid, common choice
/// (e.g. for already-compressed media) and participates in the same
/// pipeline as the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    None,
    Deflate,
    Bzip2,
    Lzma,
}

impl Algorithm {
    pub fn id(self) -> u8 {
        match self {
            Algorithm::None => 0,
            Algorithm::Deflate => 1,
            Algorithm::Bzip2 => 2,
            Algorithm::Lzma => 3,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => Algorithm::None,
            1 => Algorithm::Deflate,
            2 => Algorithm::Bzip2,
            3 => Algorithm::Lzma,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::None => "none",
            Algorithm::Deflate => "deflate",
            Algorithm::Bzip2 => "bzip2",
            Algorithm::Lzma => "lzma",
        }
    }

    /// Valid level range for this algorithm.
    pub fn level_range(self) -> std::ops::RangeInclusive<i32> {
        match self {
            Algorithm::None => 0..=0,
            Algorithm::Deflate => 0..=9,
            Algorithm::Bzip2 => 1..=9,
            Algorithm::Lzma => 1..=9,
        }
    }

    pub fn validate_level(self, level: i32) -> Result<(), CompressError> {
        if self.level_range().contains(&level) {
            Ok(())
        } else {
            Err(CompressError::UnsupportedLevel { algorithm: self, level })
        }
    }
}

/// A one-shot codec: compress a whole buffer, decompress a whole buffer.
/// The streaming `push`/`finish` contract is layered on top of this by
/// [`Pipeline`], which buffers pushed bytes and invokes the
/// one-shot codec at `finish()` — none of the four algorithms here expose
/// an incremental API in their underlying crates, so buffering the whole
/// fragment (bounded by `archive_part_size`, see `archive::writer`) is the
/// correct and only implementation.
pub trait Codec: Send + Sync {
    fn algorithm(&self) -> Algorithm;
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CompressError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressError>;
}

mod none_codec;
mod deflate_codec;
mod bzip2_codec;
mod lzma_codec;

pub use bzip2_codec::Bzip2Codec;
pub use deflate_codec::DeflateCodec;
pub use lzma_codec::LzmaCodec;
pub use none_codec::NoneCodec;

pub fn get_codec(algorithm: Algorithm) -> Box<dyn Codec> {
    match algorithm {
        Algorithm::None => Box::new(NoneCodec),
        Algorithm::Deflate => Box::new(DeflateCodec),
        Algorithm::Bzip2 => Box::new(Bzip2Codec),
        Algorithm::Lzma => Box::new(LzmaCodec),
    }
}

/// Stateful push/finish transform combining an optional delta stage with a
/// byte codec. `push` accumulates plaintext; `finish`
/// applies delta (if a source is present) then the byte codec and returns
/// the fragment's final compressed bytes. There is no true incremental
/// compression here — see the `Codec` trait doc — so `push` simply
/// extends an internal buffer and `finish` does the one-shot work.
pub struct Pipeline {
    algorithm: Algorithm,
    level: i32,
    delta_source: Option<Box<dyn delta::DeltaSource>>,
    buffer: Vec<u8>,
}

impl Pipeline {
    pub fn new(algorithm: Algorithm, level: i32) -> Result<Self, CompressError> {
        algorithm.validate_level(level)?;
        Ok(Self { algorithm, level, delta_source: None, buffer: Vec::new() })
    }

    pub fn with_delta_source(mut self, source: Box<dyn delta::DeltaSource>) -> Self {
        self.delta_source = Some(source);
        self
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn finish(self) -> Result<Vec<u8>, CompressError> {
        let plaintext = match self.delta_source {
            Some(source) => delta::encode(&source, &self.buffer),
            None => self.buffer,
        };
        get_codec(self.algorithm).compress(&plaintext, self.level)
    }
}

/// Decompress a fragment produced by [`Pipeline`]. The caller supplies the
/// same delta source (or `None`) used when the fragment was written; the
/// archive's per-entry metadata records whether a delta source was used.
pub fn decode_fragment(
    algorithm: Algorithm,
    data: &[u8],
    delta_source: Option<&dyn delta::DeltaSource>,
) -> Result<Vec<u8>, CompressError> {
    let decompressed = get_codec(algorithm).decompress(data)?;
    match delta_source {
        Some(source) => Ok(delta::decode(source, &decompressed)),
        None => Ok(decompressed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(algorithm: Algorithm, level: i32, data: &[u8]) {
        let codec = get_codec(algorithm);
        let compressed = codec.compress(data, level).unwrap();
        let decompressed = codec.decompress(&compressed).unwrap();
        assert_eq!(decompressed, data, "{algorithm:?} level {level} round-trip");
    }

    #[test]
    fn all_algorithms_round_trip_at_every_valid_level() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(200);
        for algorithm in [Algorithm::None, Algorithm::Deflate, Algorithm::Bzip2, Algorithm::Lzma] {
            for level in algorithm.level_range() {
                roundtrip(algorithm, level, &data);
            }
        }
    }

    #[test]
    fn empty_input_round_trips() {
        for algorithm in [Algorithm::None, Algorithm::Deflate, Algorithm::Bzip2, Algorithm::Lzma] {
            roundtrip(algorithm, *algorithm.level_range().start(), b"");
        }
    }

    #[test]
    fn pipeline_push_then_finish() {
        let mut p = Pipeline::new(Algorithm::Deflate, 6).unwrap();
        p.push(b"hello, ");
        p.push(b"world!");
        let compressed = p.finish().unwrap();
        let out = get_codec(Algorithm::Deflate).decompress(&compressed).unwrap();
        assert_eq!(out, b"hello, world!");
    }

    #[test]
    fn invalid_level_is_rejected() {
        assert!(Pipeline::new(Algorithm::Bzip2, 0).is_err());
        assert!(Pipeline::new(Algorithm::Deflate, 10).is_err());
    }
}
