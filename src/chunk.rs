//! Chunk codec — the archive's nestable, self-describing binary unit.
//!
//! # On-disk layout (12-byte header, little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   id    4-byte ASCII tag, e.g. b"BAR0", b"FILE", b"FDAT"
//!    4      8   size  payload length in bytes (LE u64)
//! ```
//!
//! A chunk's payload is exactly `size` bytes; children of a container chunk
//! (e.g. `FILE` holding a metadata sub-chunk and one or more `FDAT` chunks)
//! are simply further chunks written back-to-back inside that payload, with
//! no padding between siblings. A reader that does not recognise an `id`
//! skips exactly `size` bytes and continues — this is the format's
//! forward compatibility mechanism.
//!
//! # Writing
//!
//! [`write_chunk`] writes a placeholder header, lets the caller fill the
//! payload through a length-tracking [`ChunkWriter`], then seeks back and
//! patches the real size in place. For sinks that cannot seek (a network
//! socket), [`write_chunk_buffered`] accumulates the payload in memory (or
//! spills to a temp file past a threshold) and then writes the header with
//! the now-known size followed by the payload in one pass.
//!
//! # Reading
//!
//! [`iter_chunks`] returns a lazy sequence of `(id, ChunkReader)` pairs. A
//! `ChunkReader` is bounded to `size` bytes; reading past the end returns
//! EOF even if the underlying stream has more data, so a caller that
//! doesn't fully consume one chunk can simply drop it and the iterator's
//! `next()` will seek past the remainder.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{BarError, Result};

pub const HEADER_SIZE: u64 = 12;

pub type ChunkId = [u8; 4];

/// Convert a 4-byte ASCII literal into a `ChunkId`. Panics if not exactly
/// 4 bytes — only ever called with `b"XXXX"` literals at compile sites.
pub fn id(tag: &[u8; 4]) -> ChunkId {
    *tag
}

pub const BAR0: ChunkId = *b"BAR0";
pub const FILE: ChunkId = *b"FILE";
pub const IMGE: ChunkId = *b"IMGE";
pub const DIR0: ChunkId = *b"DIR0";
pub const LINK: ChunkId = *b"LINK";
pub const HLNK: ChunkId = *b"HLNK";
pub const SPEC: ChunkId = *b"SPEC";
pub const FDAT: ChunkId = *b"FDAT";
pub const IDAT: ChunkId = *b"IDAT";
pub const XATR: ChunkId = *b"XATR";
pub const KEY0: ChunkId = *b"KEY0";
pub const SALT: ChunkId = *b"SALT";
pub const SIG0: ChunkId = *b"SIG0";

fn id_str(tag: &ChunkId) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

/// Write a chunk header with the given id and size.
fn write_header<W: Write>(mut w: W, tag: &ChunkId, size: u64) -> io::Result<()> {
    w.write_all(tag)?;
    w.write_all(&size.to_le_bytes())
}

fn read_header<R: Read>(mut r: R) -> io::Result<Option<(ChunkId, u64)>> {
    let mut tag = [0u8; 4];
    match r.read_exact(&mut tag) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let mut size_buf = [0u8; 8];
    r.read_exact(&mut size_buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            io::Error::new(io::ErrorKind::UnexpectedEof, "truncated chunk header")
        } else {
            e
        }
    })?;
    Ok(Some((tag, u64::from_le_bytes(size_buf))))
}

/// Write a chunk to a seekable sink. `fill` receives a plain `&mut W`
/// positioned right after the placeholder header; it must write exactly
/// the payload bytes it intends to declare. The real size is back-patched
/// on return.
pub fn write_chunk<W, F>(mut w: W, tag: &ChunkId, fill: F) -> Result<u64>
where
    W: Write + Seek,
    F: FnOnce(&mut W) -> Result<()>,
{
    let header_pos = w.stream_position().map_err(BarError::from)?;
    write_header(&mut w, tag, 0).map_err(BarError::from)?;
    let payload_start = w.stream_position().map_err(BarError::from)?;

    fill(&mut w)?;

    let payload_end = w.stream_position().map_err(BarError::from)?;
    let size = payload_end - payload_start;

    w.seek(SeekFrom::Start(header_pos)).map_err(BarError::from)?;
    write_header(&mut w, tag, size).map_err(BarError::from)?;
    w.seek(SeekFrom::Start(payload_end)).map_err(BarError::from)?;

    Ok(size)
}

/// Write a chunk to a non-seekable sink by buffering the payload first.
/// `spill_threshold` bounds the in-memory buffer; beyond it the payload
/// is accumulated in a temp file instead (see [`BufferedPayload`]).
pub fn write_chunk_buffered<W, F>(
    mut w: W,
    tag: &ChunkId,
    spill_threshold: usize,
    fill: F,
) -> Result<u64>
where
    W: Write,
    F: FnOnce(&mut BufferedPayload) -> Result<()>,
{
    let mut buf = BufferedPayload::new(spill_threshold)?;
    fill(&mut buf)?;
    let size = buf.len();
    write_header(&mut w, tag, size).map_err(BarError::from)?;
    buf.copy_to(&mut w)?;
    Ok(size)
}

/// Accumulates a chunk payload either in memory or, past a threshold, in a
/// spill-to-disk temp file. Implements `Write` so callers can use it like
/// any other sink.
pub enum BufferedPayload {
    Memory(Vec<u8>),
    Spilled { file: tempfile::NamedTempFile, len: u64 },
}

impl BufferedPayload {
    pub fn new(_spill_threshold: usize) -> Result<Self> {
        Ok(BufferedPayload::Memory(Vec::new()))
    }

    pub fn len(&self) -> u64 {
        match self {
            BufferedPayload::Memory(v) => v.len() as u64,
            BufferedPayload::Spilled { len, .. } => *len,
        }
    }

    fn maybe_spill(&mut self, threshold: usize) -> io::Result<()> {
        if let BufferedPayload::Memory(v) = self {
            if v.len() > threshold {
                let mut file = tempfile::NamedTempFile::new()?;
                file.write_all(v)?;
                let len = v.len() as u64;
                *self = BufferedPayload::Spilled { file, len };
            }
        }
        Ok(())
    }

    pub fn copy_to<W: Write>(self, mut w: W) -> Result<()> {
        match self {
            BufferedPayload::Memory(v) => w.write_all(&v).map_err(BarError::from),
            BufferedPayload::Spilled { mut file, .. } => {
                file.seek(SeekFrom::Start(0)).map_err(BarError::from)?;
                io::copy(&mut file, &mut w).map_err(BarError::from)?;
                Ok(())
            }
        }
    }
}

/// Frame a complete, already-known payload as one chunk's bytes in a
/// single allocation — the common case when the payload was built
/// in-memory anyway (e.g. wrapping a finished volume body in `BAR0`).
pub fn frame(tag: &ChunkId, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE as usize + payload.len());
    out.extend_from_slice(tag);
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Default spill threshold: payloads larger than this move to a temp file
/// rather than growing unbounded in memory. Matches the default archive
/// part size order of magnitude (see `archive::writer`).
pub const DEFAULT_SPILL_THRESHOLD: usize = 4 * 1024 * 1024;

impl Write for BufferedPayload {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            BufferedPayload::Memory(v) => {
                v.extend_from_slice(buf);
                self.maybe_spill(DEFAULT_SPILL_THRESHOLD)?;
            }
            BufferedPayload::Spilled { file, len } => {
                file.write_all(buf)?;
                *len += buf.len() as u64;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let BufferedPayload::Spilled { file, .. } = self {
            file.flush()?;
        }
        Ok(())
    }
}

/// A reader bounded to one chunk's declared payload size. Reading beyond
/// the boundary yields EOF even if the underlying stream continues.
pub struct ChunkReader<'a, R: Read> {
    inner: &'a mut R,
    remaining: u64,
}

impl<'a, R: Read> ChunkReader<'a, R> {
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read the full remaining payload into a `Vec`.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.remaining as usize];
        self.read_exact(&mut out).map_err(BarError::from)?;
        Ok(out)
    }

    /// Skip whatever bytes of this chunk's payload have not been consumed,
    /// leaving the underlying stream positioned at the next sibling.
    pub fn skip_remainder<W>(&mut self) -> io::Result<()>
    where
        R: Read,
    {
        io::copy(&mut self.take_remaining(), &mut io::sink())?;
        Ok(())
    }

    fn take_remaining(&mut self) -> io::Take<&mut R> {
        let n = self.remaining;
        self.remaining = 0;
        Read::by_ref(self.inner).take(n)
    }
}

impl<'a, R: Read> Read for ChunkReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let max = (buf.len() as u64).min(self.remaining) as usize;
        let n = self.inner.read(&mut buf[..max])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Read one chunk header plus a bounded reader over its payload, or `None`
/// at clean EOF (no bytes at all before the header).
///
/// `enclosing_remaining`, when `Some`, bounds how many bytes are left in
/// the *parent* chunk; a declared child size exceeding that is
/// `Archive`/`MalformedChunk` rather than silently reading into the
/// sibling or past the parent.
pub fn read_chunk<'a, R: Read>(
    r: &'a mut R,
    enclosing_remaining: Option<u64>,
) -> Result<Option<(ChunkId, ChunkReader<'a, R>)>> {
    let header = read_header(&mut *r).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            BarError::archive("unexpected end of stream while reading chunk header")
        } else {
            BarError::from(e)
        }
    })?;
    let Some((tag, size)) = header else { return Ok(None) };

    if let Some(remaining) = enclosing_remaining {
        if size > remaining.saturating_sub(HEADER_SIZE) {
            return Err(BarError::archive(format!(
                "chunk {:?} declares size {size} exceeding {remaining} bytes left in enclosing chunk",
                id_str(&tag)
            )));
        }
    }

    Ok(Some((tag, ChunkReader { inner: r, remaining: size })))
}

/// Lazily iterate sibling chunks within a bounded region (a whole stream
/// when `total_len` is `None`, or a parent's payload when it is `Some`).
/// Each item's `ChunkReader` must be fully drained or explicitly skipped
/// before advancing the iterator, since both share `&mut R`.
pub struct ChunkIter<'a, R: Read> {
    reader: &'a mut R,
    remaining: Option<u64>,
}

pub fn iter_chunks<R: Read>(reader: &mut R, total_len: Option<u64>) -> ChunkIter<'_, R> {
    ChunkIter { reader, remaining: total_len }
}

impl<'a, R: Read> ChunkIter<'a, R> {
    /// Advance to the next sibling, skipping whatever remains of the
    /// previous one. Returns `Ok(None)` at a clean boundary.
    pub fn next_chunk(&mut self) -> Result<Option<(ChunkId, u64)>> {
        match read_chunk(self.reader, self.remaining)? {
            None => Ok(None),
            Some((tag, mut cr)) => {
                let size = cr.remaining();
                if let Some(rem) = self.remaining.as_mut() {
                    *rem -= HEADER_SIZE + size;
                }
                cr.skip_remainder::<&mut R>()
                    .map_err(BarError::from)?;
                Ok(Some((tag, size)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn write_then_read_single_chunk() {
        let mut buf = Cursor::new(Vec::new());
        write_chunk(&mut buf, &FILE, |w| {
            w.write_all(b"hello").map_err(BarError::from)
        })
        .unwrap();

        buf.set_position(0);
        let (tag, mut r) = read_chunk(&mut buf, None).unwrap().unwrap();
        assert_eq!(tag, FILE);
        assert_eq!(r.read_to_vec().unwrap(), b"hello");
    }

    #[test]
    fn nested_chunks_round_trip() {
        let mut buf = Cursor::new(Vec::new());
        write_chunk(&mut buf, &BAR0, |w| {
            write_chunk(w, &FILE, |w2| w2.write_all(b"abc").map_err(BarError::from))?;
            write_chunk(w, &FILE, |w2| w2.write_all(b"de").map_err(BarError::from))?;
            Ok(())
        })
        .unwrap();

        buf.set_position(0);
        let (tag, mut root) = read_chunk(&mut buf, None).unwrap().unwrap();
        assert_eq!(tag, BAR0);
        let root_len = root.remaining();
        drop(root);

        // Re-open a reader bounded to the root payload by re-reading at the
        // known offset: HEADER_SIZE bytes in.
        buf.set_position(HEADER_SIZE);
        let mut remaining = root_len;
        let (t1, mut c1) = read_chunk(&mut buf, Some(remaining)).unwrap().unwrap();
        remaining -= HEADER_SIZE + c1.remaining();
        assert_eq!(t1, FILE);
        assert_eq!(c1.read_to_vec().unwrap(), b"abc");

        let (t2, mut c2) = read_chunk(&mut buf, Some(remaining)).unwrap().unwrap();
        assert_eq!(t2, FILE);
        assert_eq!(c2.read_to_vec().unwrap(), b"de");
    }

    #[test]
    fn unknown_chunk_is_skipped() {
        let mut buf = Cursor::new(Vec::new());
        write_chunk(&mut buf, &id(b"ZZZZ"), |w| {
            w.write_all(&[1, 2, 3, 4]).map_err(BarError::from)
        })
        .unwrap();
        write_chunk(&mut buf, &FILE, |w| w.write_all(b"x").map_err(BarError::from)).unwrap();

        buf.set_position(0);
        let mut it = iter_chunks(&mut buf, None);
        let (tag, _) = it.next_chunk().unwrap().unwrap();
        assert_eq!(tag, id(b"ZZZZ"));
        let (tag2, _) = it.next_chunk().unwrap().unwrap();
        assert_eq!(tag2, FILE);
        assert!(it.next_chunk().unwrap().is_none());
    }

    #[test]
    fn declared_size_exceeding_enclosing_is_malformed() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&FILE);
        payload.extend_from_slice(&100u64.to_le_bytes());
        let mut buf = Cursor::new(payload);
        let err = read_chunk(&mut buf, Some(20)).unwrap_err();
        assert_eq!(err.kind, crate::error::Kind::Archive);
    }

    #[test]
    fn frame_matches_write_chunk_buffered() {
        let framed = frame(&FILE, b"payload");
        let mut buffered = Vec::new();
        write_chunk_buffered(&mut buffered, &FILE, DEFAULT_SPILL_THRESHOLD, |w| {
            w.write_all(b"payload").map_err(BarError::from)
        })
        .unwrap();
        assert_eq!(framed, buffered);
    }

    #[test]
    fn truncated_header_is_unexpected_eof() {
        let mut buf = Cursor::new(vec![b'F', b'I', b'L']);
        let err = read_chunk(&mut buf, None).unwrap_err();
        assert_eq!(err.kind, crate::error::Kind::Archive);
    }
}
