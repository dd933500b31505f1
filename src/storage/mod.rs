//! Storage backend: one streaming I/O contract shared by every transport
//! (local filesystem, FTP, SFTP, WebDAV, optical media), selected by the
//! scheme prefix of a storage URI. Shaped after the `SixCyWriter`/
//! `SixCyReader` pair (open/write/seek/close over a generic stream) but
//! lifted to a trait object so the archive writer can be handed any
//! backend without knowing which one it is.

mod ftp;
pub(crate) mod local;
mod optical;
mod sftp;
mod throttle;
mod uri;
mod webdav;

use std::io;

pub use local::LocalBackend;
pub use throttle::{Priority, TokenBucket};
pub use uri::parse_uri;

/// Raised by an optical backend when it needs a human to load or unload
/// a volume before `create`/`open` can proceed. The job engine catches
/// this and transitions the job into `REQUEST_VOLUME`.
#[derive(Debug, Clone)]
pub struct RequestVolume {
    pub volume_number: u32,
    pub message: String,
}

impl std::fmt::Display for RequestVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "volume {} requested: {}", self.volume_number, self.message)
    }
}

impl std::error::Error for RequestVolume {}

/// A lazily-listable directory entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub is_directory: bool,
}

/// An open handle to a storage object. Backends implement this directly
/// over whatever stream primitive they have (a `File`, an FTP data
/// connection, an SSH channel, an HTTP body).
pub trait Handle: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn seek(&mut self, offset: u64) -> io::Result<()>;
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// The storage contract every transport implements.
pub trait StorageBackend: Send + Sync {
    /// Create a new object, optionally hinting its final size (useful for
    /// pre-allocating on backends that benefit from it). May return
    /// `RequestVolume` wrapped in the io error for optical media.
    fn create(&self, name: &str, size_hint: Option<u64>) -> io::Result<Box<dyn Handle>>;
    fn open(&self, name: &str) -> io::Result<Box<dyn Handle>>;
    fn exists(&self, name: &str) -> io::Result<bool>;
    fn delete(&self, name: &str) -> io::Result<()>;
    /// A lazy sequence of directory entries; backends that can stream a
    /// listing (FTP, WebDAV PROPFIND) should not buffer the whole
    /// directory before returning.
    fn list_directory(&self, path: &str) -> io::Result<Box<dyn Iterator<Item = io::Result<DirEntry>>>>;
}

/// Construct the backend named by a storage URI's scheme. Bare paths with
/// no `scheme://` prefix are treated as local filesystem paths.
pub fn open_backend(uri: &str) -> io::Result<Box<dyn StorageBackend>> {
    let parsed = parse_uri(uri)?;
    match parsed.scheme.as_str() {
        "file" | "" => Ok(Box::new(local::LocalBackend::new(parsed.path))),
        "ftp" => Ok(Box::new(ftp::FtpBackend::new(parsed)?)),
        "sftp" | "ssh" => Ok(Box::new(sftp::SftpBackend::new(parsed)?)),
        "webdav" | "webdavs" => Ok(Box::new(webdav::WebDavBackend::new(parsed)?)),
        "optical" => Ok(Box::new(optical::OpticalBackend::new(parsed))),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unknown storage scheme {other:?}"),
        )),
    }
}
