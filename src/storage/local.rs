use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use super::{DirEntry, Handle, StorageBackend};

pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name.trim_start_matches('/'))
    }
}

struct LocalHandle(File);

impl Handle for LocalHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }
    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.0.seek(SeekFrom::Start(offset)).map(|_| ())
    }
    fn close(self: Box<Self>) -> io::Result<()> {
        self.0.sync_all()
    }
}

impl StorageBackend for LocalBackend {
    fn create(&self, name: &str, size_hint: Option<u64>) -> io::Result<Box<dyn Handle>> {
        let path = self.resolve(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(&path)?;
        if let Some(size) = size_hint {
            file.set_len(size)?;
        }
        Ok(Box::new(LocalHandle(file)))
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Handle>> {
        let file = OpenOptions::new().read(true).write(true).open(self.resolve(name))?;
        Ok(Box::new(LocalHandle(file)))
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        Ok(self.resolve(name).exists())
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(name))
    }

    fn list_directory(&self, path: &str) -> io::Result<Box<dyn Iterator<Item = io::Result<DirEntry>>>> {
        let dir = self.resolve(path);
        let entries = fs::read_dir(dir)?;
        Ok(Box::new(entries.map(|entry| {
            let entry = entry?;
            let metadata = entry.metadata()?;
            Ok(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                is_directory: metadata.is_dir(),
            })
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_write_reopen_read_round_trips() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());

        let mut handle = backend.create("vol-000001.bar", None).unwrap();
        handle.write(b"hello archive").unwrap();
        handle.close().unwrap();

        let mut handle = backend.open("vol-000001.bar").unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 32];
        loop {
            let n = handle.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(buf, b"hello archive");
    }

    #[test]
    fn exists_and_delete() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.create("a.bar", None).unwrap().close().unwrap();
        assert!(backend.exists("a.bar").unwrap());
        backend.delete("a.bar").unwrap();
        assert!(!backend.exists("a.bar").unwrap());
    }

    #[test]
    fn list_directory_enumerates_entries() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.create("a.bar", None).unwrap().close().unwrap();
        backend.create("b.bar", None).unwrap().close().unwrap();
        let names: Vec<String> = backend
            .list_directory("")
            .unwrap()
            .map(|e| e.unwrap().name)
            .collect();
        assert_eq!(names.len(), 2);
    }
}
