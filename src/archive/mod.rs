//! Archive format: entries, volumes, the incremental list, and the
//! writer/reader pair that produce and consume them.

pub mod entry;
pub mod incremental;
pub mod reader;
pub mod volume;
mod wire;
pub mod writer;

pub use entry::{CryptParams, Entry, EntryHeader, EntryKind, Fragment, Metadata, SpecialKind};
pub use incremental::IncrementalList;
pub use reader::{ArchiveReader, PasswordList, ReaderCrypt};
pub use volume::{parse_volume_name, volume_name};
pub use writer::{ArchiveWriter, WriterCrypt, WriterOptions};
