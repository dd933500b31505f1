//! FTP backend. `suppaftp`'s `FtpStream` is not internally buffered for
//! random access, so writes are accumulated in memory and uploaded whole
//! on `close()`, and reads download the whole object once and then serve
//! from an in-memory cursor — the same "whole block in, whole block out"
//! shape the archive writer already uses for its own chunks, just pushed
//! one layer down.

use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex};

use suppaftp::FtpStream;

use super::uri::ParsedUri;
use super::{DirEntry, Handle, StorageBackend};

pub struct FtpBackend {
    stream: Arc<Mutex<FtpStream>>,
    root: String,
}

impl FtpBackend {
    pub fn new(uri: ParsedUri) -> io::Result<Self> {
        let host = uri.host.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "ftp uri missing host"))?;
        let port = uri.port.unwrap_or(21);
        let mut stream = FtpStream::connect((host.as_str(), port))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let user = uri.user.as_deref().unwrap_or("anonymous");
        let password = uri.password.as_deref().unwrap_or("");
        stream
            .login(user, password)
            .map_err(|e| io::Error::new(io::ErrorKind::PermissionDenied, e.to_string()))?;
        Ok(Self { stream: Arc::new(Mutex::new(stream)), root: uri.path })
    }

    fn resolve(&self, name: &str) -> String {
        format!("{}/{}", self.root.trim_end_matches('/'), name.trim_start_matches('/'))
    }
}

struct FtpWriteHandle {
    stream: Arc<Mutex<FtpStream>>,
    path: String,
    buffer: Vec<u8>,
}

impl Handle for FtpWriteHandle {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "handle opened for writing"))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn seek(&mut self, _offset: u64) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "cannot seek a write handle"))
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let mut stream = self.stream.lock().unwrap();
        let mut reader = Cursor::new(self.buffer);
        stream
            .put_file(&self.path, &mut reader)
            .map(|_| ())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

struct FtpReadHandle {
    cursor: Cursor<Vec<u8>>,
}

impl Handle for FtpReadHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }

    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "handle opened for reading"))
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.cursor.set_position(offset);
        Ok(())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

impl StorageBackend for FtpBackend {
    fn create(&self, name: &str, _size_hint: Option<u64>) -> io::Result<Box<dyn Handle>> {
        Ok(Box::new(FtpWriteHandle {
            stream: Arc::clone(&self.stream),
            path: self.resolve(name),
            buffer: Vec::new(),
        }))
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Handle>> {
        let path = self.resolve(name);
        let mut stream = self.stream.lock().unwrap();
        let bytes = stream
            .retr_as_buffer(&path)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?
            .into_inner();
        Ok(Box::new(FtpReadHandle { cursor: Cursor::new(bytes) }))
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        let path = self.resolve(name);
        let mut stream = self.stream.lock().unwrap();
        Ok(stream.size(&path).is_ok())
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        let path = self.resolve(name);
        let mut stream = self.stream.lock().unwrap();
        stream.rm(&path).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }

    fn list_directory(&self, path: &str) -> io::Result<Box<dyn Iterator<Item = io::Result<DirEntry>>>> {
        let dir = self.resolve(path);
        let mut stream = self.stream.lock().unwrap();
        let names = stream
            .nlst(Some(&dir))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(Box::new(names.into_iter().map(|name| Ok(DirEntry { name, size: 0, is_directory: false }))))
    }
}
