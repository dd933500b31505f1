//! Optical media backend. Wraps a local mount point but signals
//! `RequestVolume` instead of a plain I/O error when the expected volume
//! isn't the one currently mounted — the job engine turns that into the
//! `REQUEST_VOLUME` job state and waits for the operator.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

use super::local::LocalBackend;
use super::uri::ParsedUri;
use super::{DirEntry, Handle, RequestVolume, StorageBackend};

pub struct OpticalBackend {
    local: LocalBackend,
    current_volume: AtomicU32,
}

impl OpticalBackend {
    pub fn new(uri: ParsedUri) -> Self {
        Self { local: LocalBackend::new(uri.path), current_volume: AtomicU32::new(1) }
    }

    /// Called by the job engine once the operator confirms a volume swap.
    pub fn confirm_volume_loaded(&self, volume_number: u32) {
        self.current_volume.store(volume_number, Ordering::SeqCst);
    }

    fn volume_for(&self, name: &str) -> u32 {
        // Volume naming is `<base>-NNNNNN.bar`; the NNNNNN segment is the
        // volume number.
        name.rsplit('-')
            .next()
            .and_then(|segment| segment.split('.').next())
            .and_then(|digits| digits.parse().ok())
            .unwrap_or(1)
    }

    fn ensure_volume_mounted(&self, name: &str) -> io::Result<()> {
        let wanted = self.volume_for(name);
        let mounted = self.current_volume.load(Ordering::SeqCst);
        if wanted != mounted {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                RequestVolume { volume_number: wanted, message: format!("insert volume {wanted}, currently {mounted} is mounted") },
            ));
        }
        Ok(())
    }
}

impl StorageBackend for OpticalBackend {
    fn create(&self, name: &str, size_hint: Option<u64>) -> io::Result<Box<dyn Handle>> {
        self.ensure_volume_mounted(name)?;
        self.local.create(name, size_hint)
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Handle>> {
        self.ensure_volume_mounted(name)?;
        self.local.open(name)
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        self.local.exists(name)
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        self.local.delete(name)
    }

    fn list_directory(&self, path: &str) -> io::Result<Box<dyn Iterator<Item = io::Result<DirEntry>>>> {
        self.local.list_directory(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mismatched_volume_raises_request_volume() {
        let dir = tempdir().unwrap();
        let backend = OpticalBackend::new(ParsedUri {
            scheme: "optical".into(),
            user: None,
            password: None,
            host: None,
            port: None,
            path: dir.path().to_string_lossy().into_owned(),
        });
        let err = backend.create("job-000002.bar", None).unwrap_err();
        assert!(err.get_ref().unwrap().downcast_ref::<RequestVolume>().is_some());
    }

    #[test]
    fn confirmed_volume_allows_create() {
        let dir = tempdir().unwrap();
        let backend = OpticalBackend::new(ParsedUri {
            scheme: "optical".into(),
            user: None,
            password: None,
            host: None,
            port: None,
            path: dir.path().to_string_lossy().into_owned(),
        });
        backend.confirm_volume_loaded(2);
        assert!(backend.create("job-000002.bar", None).is_ok());
    }
}
