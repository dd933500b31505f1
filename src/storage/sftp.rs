//! SFTP/SSH backend. Drives a remote `sftp`-style binary in batch mode
//! over a raw SSH channel rather than using SFTP subsystem negotiation
//! — `ssh2::Channel::exec` with a scripted batch file gives the same
//! "one shell command, stream stdin/stdout" shape the streaming
//! writer/reader pair already assumes.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use ssh2::Session;

use super::uri::ParsedUri;
use super::{DirEntry, Handle, StorageBackend};

pub struct SftpBackend {
    session: Arc<Mutex<Session>>,
    root: String,
}

impl SftpBackend {
    pub fn new(uri: ParsedUri) -> io::Result<Self> {
        let host = uri.host.clone().ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "sftp uri missing host"))?;
        let port = uri.port.unwrap_or(22);
        let tcp = TcpStream::connect((host.as_str(), port))?;

        let mut session = Session::new().map_err(ssh_err)?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(ssh_err)?;

        if let Some(user) = &uri.user {
            session.userauth_agent(user).map_err(ssh_err)?;
            if !session.authenticated() {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "ssh agent authentication failed"));
            }
        }

        Ok(Self { session: Arc::new(Mutex::new(session)), root: uri.path })
    }

    fn resolve(&self, name: &str) -> String {
        format!("{}/{}", self.root.trim_end_matches('/'), name.trim_start_matches('/'))
    }

    fn run_batch(&self, command: &str, stdin: Option<&[u8]>) -> io::Result<Vec<u8>> {
        let session = self.session.lock().unwrap();
        let mut channel = session.channel_session().map_err(ssh_err)?;
        channel.exec(command).map_err(ssh_err)?;
        if let Some(data) = stdin {
            channel.write_all(data)?;
        }
        channel.send_eof().map_err(ssh_err)?;
        let mut out = Vec::new();
        channel.read_to_end(&mut out)?;
        channel.wait_close().map_err(ssh_err)?;
        let status = channel.exit_status().map_err(ssh_err)?;
        if status != 0 {
            return Err(io::Error::new(io::ErrorKind::Other, format!("remote sftp batch exited with status {status}")));
        }
        Ok(out)
    }
}

fn ssh_err(e: ssh2::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

struct SftpHandle {
    backend_root: String,
    session: Arc<Mutex<Session>>,
    path: String,
    buffer: Vec<u8>,
    read_pos: usize,
    mode: HandleMode,
}

enum HandleMode {
    Reading,
    Writing,
}

impl Handle for SftpHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !matches!(self.mode, HandleMode::Reading) {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "handle opened for writing"));
        }
        let remaining = &self.buffer[self.read_pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.read_pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !matches!(self.mode, HandleMode::Writing) {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "handle opened for reading"));
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.read_pos = offset as usize;
        Ok(())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        if !matches!(self.mode, HandleMode::Writing) {
            return Ok(());
        }
        let session = self.session.lock().unwrap();
        let mut channel = session.channel_session().map_err(ssh_err)?;
        channel.exec(&format!("cat > {}", shell_quote(&self.path))).map_err(ssh_err)?;
        channel.write_all(&self.buffer)?;
        channel.send_eof().map_err(ssh_err)?;
        channel.wait_close().map_err(ssh_err)?;
        let _ = &self.backend_root;
        Ok(())
    }
}

fn shell_quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', "'\\''"))
}

impl StorageBackend for SftpBackend {
    fn create(&self, name: &str, _size_hint: Option<u64>) -> io::Result<Box<dyn Handle>> {
        Ok(Box::new(SftpHandle {
            backend_root: self.root.clone(),
            session: Arc::clone(&self.session),
            path: self.resolve(name),
            buffer: Vec::new(),
            read_pos: 0,
            mode: HandleMode::Writing,
        }))
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Handle>> {
        let path = self.resolve(name);
        let bytes = self.run_batch(&format!("cat {}", shell_quote(&path)), None)?;
        Ok(Box::new(SftpHandle {
            backend_root: self.root.clone(),
            session: Arc::clone(&self.session),
            path,
            buffer: bytes,
            read_pos: 0,
            mode: HandleMode::Reading,
        }))
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        let path = self.resolve(name);
        let out = self.run_batch(&format!("test -e {} && echo 1 || echo 0", shell_quote(&path)), None)?;
        Ok(out.starts_with(b"1"))
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        let path = self.resolve(name);
        self.run_batch(&format!("rm -f {}", shell_quote(&path)), None).map(|_| ())
    }

    fn list_directory(&self, path: &str) -> io::Result<Box<dyn Iterator<Item = io::Result<DirEntry>>>> {
        let dir = self.resolve(path);
        let out = self.run_batch(&format!("ls -1 {}", shell_quote(&dir)), None)?;
        let names: Vec<String> = String::from_utf8_lossy(&out).lines().map(str::to_string).collect();
        Ok(Box::new(names.into_iter().map(|name| Ok(DirEntry { name, size: 0, is_directory: false }))))
    }
}
