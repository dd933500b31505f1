//! # barc — a portable, chunked multi-volume backup archiver
//!
//! Format guarantees:
//! - All numeric fields are little-endian; every chunk is a 12-byte
//!   `{id: [u8;4], size: u64}` header followed by its payload
//! - The root chunk of every volume is `BAR0`; volumes are named
//!   `<base>-NNNNNN.bar` and chained by that numbering alone
//! - Entries (`FILE`/`IMGE`/`DIR0`/`LINK`/`HLNK`/`SPEC`) carry their own
//!   metadata and, for data-bearing kinds, a sequence of `FDAT`/`IDAT`
//!   fragment chunks addressed by absolute offset and plaintext length
//! - Compression is applied before encryption; encryption is applied
//!   per fragment, never to the chunk framing itself
//! - An optional trailing `SIG0` chunk carries a whole-volume BLAKE3
//!   digest for truncation detection; its absence is never an error

pub mod archive;
pub mod chunk;
pub mod compress;
pub mod connector;
pub mod crypt;
pub mod error;
pub mod index;
pub mod job;
pub mod scheduler;
pub mod storage;
pub mod wire;

pub use archive::{ArchiveReader, ArchiveWriter, Entry, EntryHeader, EntryKind, WriterOptions};
pub use chunk::ChunkId;
pub use compress::Algorithm as CompressAlgorithm;
pub use crypt::{derive_key, Algorithm as CryptAlgorithm};
pub use error::{BarError, Kind as ErrorKind, Result};
pub use index::IndexStore;
pub use job::{ArchiveType, JobConfig, JobListLock, JobState};
pub use scheduler::Scheduler;
pub use storage::{open_backend, StorageBackend};
