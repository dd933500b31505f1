//! The incremental list file: a per-job record of (name, size, mtime,
//! head-hash) used to skip unchanged entries on the next run. Binary and
//! fixed-length-prefixed rather than CSV/JSON — the writer compares many
//! records per run and BLAKE3 is already a crate dependency via fragment
//! hashing, so there's no parsing or quoting edge case to get wrong.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

const MAGIC: &[u8; 4] = b"BINC";
const VERSION: u16 = 1;
const HEAD_HASH_WINDOW: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub size: u64,
    pub mtime: i64,
    pub head_hash: [u8; 32],
}

#[derive(Debug, Default)]
pub struct IncrementalList {
    records: HashMap<String, Record>,
}

impl IncrementalList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(r: &mut impl Read) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not an incremental list file"));
        }
        let version = r.read_u16::<LittleEndian>()?;
        if version != VERSION {
            return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unsupported incremental list version {version}")));
        }
        let count = r.read_u64::<LittleEndian>()?;
        let mut records = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let name_len = r.read_u16::<LittleEndian>()? as usize;
            let mut name_bytes = vec![0u8; name_len];
            r.read_exact(&mut name_bytes)?;
            let name = String::from_utf8(name_bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            let size = r.read_u64::<LittleEndian>()?;
            let mtime = r.read_i64::<LittleEndian>()?;
            let mut head_hash = [0u8; 32];
            r.read_exact(&mut head_hash)?;
            records.insert(name, Record { size, mtime, head_hash });
        }
        Ok(Self { records })
    }

    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_all(MAGIC)?;
        w.write_u16::<LittleEndian>(VERSION)?;
        w.write_u64::<LittleEndian>(self.records.len() as u64)?;
        for (name, record) in &self.records {
            w.write_u16::<LittleEndian>(name.len() as u16)?;
            w.write_all(name.as_bytes())?;
            w.write_u64::<LittleEndian>(record.size)?;
            w.write_i64::<LittleEndian>(record.mtime)?;
            w.write_all(&record.head_hash)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Record> {
        self.records.get(name)
    }

    pub fn set(&mut self, name: String, record: Record) {
        self.records.insert(name, record);
    }

    /// True when a candidate entry's current (size, mtime, head hash)
    /// matches the recorded one, meaning its data chunks can be omitted
    /// from the archive.
    pub fn is_unchanged(&self, name: &str, size: u64, mtime: i64, head_hash: &[u8; 32]) -> bool {
        matches!(self.records.get(name), Some(r) if r.size == size && r.mtime == mtime && &r.head_hash == head_hash)
    }
}

/// BLAKE3 of the first [`HEAD_HASH_WINDOW`] bytes, or of the whole slice
/// if it is smaller.
pub fn head_hash(data: &[u8]) -> [u8; 32] {
    let window = &data[..data.len().min(HEAD_HASH_WINDOW)];
    blake3::hash(window).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn write_then_read_round_trips() {
        let mut list = IncrementalList::new();
        list.set("etc/passwd".into(), Record { size: 2048, mtime: 1_700_000_000, head_hash: head_hash(b"root:x:0:0") });
        list.set("var/log/syslog".into(), Record { size: 0, mtime: 0, head_hash: head_hash(b"") });

        let mut buf = Vec::new();
        list.write(&mut buf).unwrap();
        let read_back = IncrementalList::read(&mut Cursor::new(buf)).unwrap();

        assert_eq!(read_back.get("etc/passwd"), list.get("etc/passwd"));
        assert_eq!(read_back.get("var/log/syslog"), list.get("var/log/syslog"));
    }

    #[test]
    fn is_unchanged_requires_exact_match() {
        let mut list = IncrementalList::new();
        let hash = head_hash(b"content");
        list.set("a".into(), Record { size: 7, mtime: 100, head_hash: hash });

        assert!(list.is_unchanged("a", 7, 100, &hash));
        assert!(!list.is_unchanged("a", 8, 100, &hash));
        assert!(!list.is_unchanged("a", 7, 101, &hash));
        assert!(!list.is_unchanged("missing", 7, 100, &hash));
    }

    #[test]
    fn rejects_bad_magic() {
        let err = IncrementalList::read(&mut Cursor::new(b"NOPE".to_vec())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
