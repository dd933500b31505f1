//! Archive entry metadata shared by the writer and reader: name,
//! filesystem metadata, crypt parameters, and the fragment list for
//! entries whose payload may span volumes.

use crate::crypt::{Algorithm as CryptAlgorithm, CryptType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Image,
    Directory,
    Link,
    Hardlink,
    Special,
}

impl EntryKind {
    pub fn chunk_id(self) -> [u8; 4] {
        match self {
            EntryKind::File => crate::chunk::FILE,
            EntryKind::Image => crate::chunk::IMGE,
            EntryKind::Directory => crate::chunk::DIR0,
            EntryKind::Link => crate::chunk::LINK,
            EntryKind::Hardlink => crate::chunk::HLNK,
            EntryKind::Special => crate::chunk::SPEC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
}

/// Filesystem metadata common to every entry kind, with a couple of
/// fields only meaningful for some (`major`/`minor` for special files,
/// `filesystem_type` for raw images).
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub size: u64,
    pub mtime: i64,
    pub atime: i64,
    pub ctime: i64,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub major: Option<u32>,
    pub minor: Option<u32>,
    pub filesystem_type: Option<String>,
}

/// Crypt parameters attached to an entry's fragments. `salt` is present
/// only for symmetric entries; asymmetric entries instead carry a
/// wrapped-key reference resolved through the archive's `KEY0` chunk.
#[derive(Debug, Clone)]
pub struct CryptParams {
    pub algorithm: CryptAlgorithm,
    pub crypt_type: CryptType,
    pub salt: Option<[u8; 16]>,
}

/// One contiguous, possibly-compressed-and-encrypted slice of an entry's
/// data, at most as large as the containing volume allows.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub offset: u64,
    pub size: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub kind: EntryKind,
    pub name: String,
    pub metadata: Metadata,
    pub crypt: Option<CryptParams>,
    pub special_kind: Option<SpecialKind>,
    pub link_target: Option<String>,
    pub fragments: Vec<Fragment>,
}

/// What `ArchiveReader::next_entry` yields: everything about an entry
/// except its fragment payload bytes, which are pulled separately via
/// `read_entry_data` so callers can stream large files without buffering
/// the whole thing.
#[derive(Debug, Clone)]
pub struct EntryHeader {
    pub kind: EntryKind,
    pub name: String,
    pub metadata: Metadata,
    pub crypt: Option<CryptParams>,
    pub special_kind: Option<SpecialKind>,
    pub link_target: Option<String>,
    pub total_size: u64,
}
