//! Archive writer: accepts entries one at a time, routes their data
//! through delta → compression → encryption → chunk codec, and splits
//! the result across volumes bounded by `archive_part_size`.
//!
//! Shaped after `SixCyWriter`'s overall writer shape (an options struct,
//! one `add_*` method per content kind, a `finalize` that patches/closes
//! the last open container) but generalized from a single on-disk file
//! to the storage-backend abstraction, and from a single chunked-CAS
//! mode to per-entry fragmentation across volumes.

use std::io;

use byteorder::{LittleEndian, WriteBytesExt};
use rand::RngCore;
use rsa::RsaPublicKey;

use crate::chunk::{self, ChunkId};
use crate::compress::{self, delta::DeltaSource};
use crate::crypt::{self, asymmetric, passphrase::Passphrase, Algorithm as CryptAlgorithm, CryptType};
use crate::error::{BarError, Result};
use crate::storage::{Handle, StorageBackend};

use super::entry::{CryptParams, EntryKind, Metadata, SpecialKind};
use super::incremental::{self, IncrementalList};
use super::wire;
use super::volume::volume_name;

/// The per-archive key material and how it's applied to each entry.
pub enum WriterCrypt {
    None,
    Symmetric { algorithm: CryptAlgorithm, key: Vec<u8>, salt: [u8; 16] },
    Asymmetric { algorithm: CryptAlgorithm, symmetric_key: Vec<u8>, wrapped_key: Vec<u8> },
}

impl WriterCrypt {
    pub fn symmetric(algorithm: CryptAlgorithm, passphrase: &Passphrase) -> Self {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let key = crypt::derive_key(passphrase, &salt, algorithm);
        WriterCrypt::Symmetric { algorithm, key, salt }
    }

    pub fn asymmetric(algorithm: CryptAlgorithm, public_key: &RsaPublicKey) -> Result<Self> {
        let mut symmetric_key = vec![0u8; algorithm.key_len()];
        rand::thread_rng().fill_bytes(&mut symmetric_key);
        let wrapped_key = asymmetric::wrap_key(public_key, &symmetric_key)
            .map_err(|e| BarError::crypto(e.to_string()))?;
        Ok(WriterCrypt::Asymmetric { algorithm, symmetric_key, wrapped_key })
    }

    fn entry_params(&self) -> Option<CryptParams> {
        match self {
            WriterCrypt::None => None,
            WriterCrypt::Symmetric { algorithm, salt, .. } => {
                Some(CryptParams { algorithm: *algorithm, crypt_type: CryptType::Symmetric, salt: Some(*salt) })
            }
            WriterCrypt::Asymmetric { algorithm, .. } => {
                Some(CryptParams { algorithm: *algorithm, crypt_type: CryptType::Asymmetric, salt: None })
            }
        }
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            WriterCrypt::None => Ok(plaintext.to_vec()),
            WriterCrypt::Symmetric { algorithm, key, .. } => {
                crypt::encrypt(*algorithm, key, plaintext).map_err(|e| BarError::crypto(e.to_string()))
            }
            WriterCrypt::Asymmetric { algorithm, symmetric_key, .. } => {
                crypt::encrypt(*algorithm, symmetric_key, plaintext).map_err(|e| BarError::crypto(e.to_string()))
            }
        }
    }

    fn wrapped_key_chunk(&self) -> Option<Vec<u8>> {
        match self {
            WriterCrypt::Asymmetric { wrapped_key, .. } => Some(chunk::frame(&chunk::KEY0, wrapped_key)),
            _ => None,
        }
    }
}

pub struct WriterOptions {
    pub base_name: String,
    pub archive_part_size: u64,
    pub compression: compress::Algorithm,
    pub compression_level: i32,
    pub crypt: WriterCrypt,
    /// Append a whole-volume BLAKE3 integrity chunk (`SIG0`) after `BAR0`.
    pub include_signature: bool,
    /// Plaintext bytes per fragment before a rotation check is made.
    pub max_piece_size: usize,
}

impl WriterOptions {
    pub fn new(base_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            archive_part_size: u64::MAX,
            compression: compress::Algorithm::None,
            compression_level: 0,
            crypt: WriterCrypt::None,
            include_signature: false,
            max_piece_size: 4 * 1024 * 1024,
        }
    }
}

pub struct ArchiveWriter {
    storage: Box<dyn StorageBackend>,
    options: WriterOptions,
    volume_number: u32,
    volume_body: Vec<u8>,
    produced_storages: Vec<String>,
    incremental_list: Option<IncrementalList>,
    closed: bool,
}

fn write_all_handle(handle: &mut dyn Handle, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        let n = handle.write(buf)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "storage handle accepted zero bytes"));
        }
        buf = &buf[n..];
    }
    Ok(())
}

/// Network glitches and transient conditions are worth a fresh volume and
/// a retry; anything else (no space left with no successor media, auth
/// rejected mid-stream) is fatal and aborts the whole run.
fn is_retriable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::WouldBlock
    )
}

impl ArchiveWriter {
    pub fn new(storage: Box<dyn StorageBackend>, options: WriterOptions, incremental_list: Option<IncrementalList>) -> Self {
        Self {
            storage,
            options,
            volume_number: 1,
            volume_body: Vec::new(),
            produced_storages: Vec::new(),
            incremental_list,
            closed: false,
        }
    }

    fn would_overflow(&self, pending_len: usize, additional: usize) -> bool {
        !self.volume_body.is_empty()
            && (self.volume_body.len() + pending_len + additional) as u64 > self.options.archive_part_size
    }

    fn current_volume_name(&self) -> String {
        volume_name(&self.options.base_name, self.volume_number)
    }

    fn finalize_current_volume(&mut self) -> Result<()> {
        let mut body = Vec::new();
        if let Some(key0) = self.options.crypt.wrapped_key_chunk() {
            body.extend_from_slice(&key0);
        }
        body.extend_from_slice(&self.volume_body);

        let mut out = chunk::frame(&chunk::BAR0, &body);
        if self.options.include_signature {
            let hash = blake3::hash(&body);
            out.extend_from_slice(&chunk::frame(&chunk::SIG0, hash.as_bytes()));
        }

        let name = self.current_volume_name();
        let attempt = || -> io::Result<()> {
            let mut handle = self.storage.create(&name, Some(out.len() as u64))?;
            write_all_handle(handle.as_mut(), &out)?;
            handle.close()
        };

        match attempt() {
            Ok(()) => {
                self.produced_storages.push(name);
                Ok(())
            }
            Err(e) if is_retriable(&e) => {
                // Leave this volume's name off the produced list; the
                // caller rotates to a fresh one and resumes.
                tracing::warn!(volume = name, error = %e, "retriable storage failure, rotating to a new volume");
                Err(BarError::with_cause(crate::error::Kind::Io, format!("retriable failure writing {name}, will retry on a new volume"), e))
            }
            Err(e) => Err(BarError::with_cause(crate::error::Kind::Resource, format!("fatal failure writing {name}"), e)),
        }
    }

    fn rotate_volume(&mut self) -> Result<()> {
        self.finalize_current_volume()?;
        self.volume_number += 1;
        self.volume_body.clear();
        tracing::info!(volume_number = self.volume_number, "rotated to new volume");
        Ok(())
    }

    fn flush_entry_chunk(
        &mut self,
        chunk_id: ChunkId,
        name: &str,
        metadata: &Metadata,
        crypt: &Option<CryptParams>,
        special_kind: Option<SpecialKind>,
        link_target: Option<&str>,
        fragment_bytes: &[u8],
    ) -> Result<()> {
        let mut payload = Vec::new();
        wire::write_str(&mut payload, name).map_err(BarError::from)?;
        wire::write_metadata(&mut payload, metadata).map_err(BarError::from)?;
        wire::write_crypt_params(&mut payload, crypt.as_ref()).map_err(BarError::from)?;
        wire::write_special_kind(&mut payload, special_kind).map_err(BarError::from)?;
        match link_target {
            Some(t) => {
                payload.push(1);
                wire::write_str(&mut payload, t).map_err(BarError::from)?;
            }
            None => payload.push(0),
        }
        payload.extend_from_slice(fragment_bytes);

        let framed = chunk::frame(&chunk_id, &payload);
        self.volume_body.extend_from_slice(&framed);
        Ok(())
    }

    fn add_data_entry(
        &mut self,
        kind: EntryKind,
        name: &str,
        metadata: Metadata,
        delta_source: Option<&dyn DeltaSource>,
        data: &[u8],
    ) -> Result<()> {
        let head = incremental::head_hash(data);
        if let Some(list) = &self.incremental_list {
            if list.is_unchanged(name, metadata.size, metadata.mtime, &head) {
                let crypt = self.options.crypt.entry_params();
                self.flush_entry_chunk(kind.chunk_id(), name, &metadata, &crypt, None, None, &[])?;
                return Ok(());
            }
        }

        let transformed = match delta_source {
            Some(source) => compress::delta::encode(source, data),
            None => data.to_vec(),
        };
        let crypt_params = self.options.crypt.entry_params();
        let fragment_tag = if kind == EntryKind::Image { chunk::IDAT } else { chunk::FDAT };

        let mut offset = 0u64;
        let mut fragment_bytes: Vec<u8> = Vec::new();
        let pieces: Vec<&[u8]> = if transformed.is_empty() {
            Vec::new()
        } else {
            transformed.chunks(self.options.max_piece_size.max(1)).collect()
        };

        for piece in pieces {
            let codec = compress::get_codec(self.options.compression);
            let compressed = codec
                .compress(piece, self.options.compression_level)
                .map_err(|e| BarError::archive(e.to_string()))?;
            let ciphertext = self.options.crypt.encrypt(&compressed)?;

            let mut fragment_payload = Vec::with_capacity(16 + ciphertext.len());
            fragment_payload.write_u64::<LittleEndian>(offset).map_err(BarError::from)?;
            fragment_payload.write_u64::<LittleEndian>(piece.len() as u64).map_err(BarError::from)?;
            fragment_payload.extend_from_slice(&ciphertext);
            let framed_fragment = chunk::frame(&fragment_tag, &fragment_payload);

            if self.would_overflow(fragment_bytes.len(), framed_fragment.len()) {
                if !fragment_bytes.is_empty() {
                    self.flush_entry_chunk(kind.chunk_id(), name, &metadata, &crypt_params, None, None, &fragment_bytes)?;
                    fragment_bytes.clear();
                }
                self.rotate_volume()?;
            }
            fragment_bytes.extend_from_slice(&framed_fragment);
            offset += piece.len() as u64;
        }

        self.flush_entry_chunk(kind.chunk_id(), name, &metadata, &crypt_params, None, None, &fragment_bytes)?;

        if let Some(list) = &mut self.incremental_list {
            list.set(name.to_string(), incremental::Record { size: metadata.size, mtime: metadata.mtime, head_hash: head });
        }
        Ok(())
    }

    pub fn add_file(&mut self, name: &str, metadata: Metadata, data: &[u8]) -> Result<()> {
        self.add_data_entry(EntryKind::File, name, metadata, None, data)
    }

    pub fn add_file_with_delta(&mut self, name: &str, metadata: Metadata, data: &[u8], source: &dyn DeltaSource) -> Result<()> {
        self.add_data_entry(EntryKind::File, name, metadata, Some(source), data)
    }

    pub fn add_image(&mut self, name: &str, metadata: Metadata, data: &[u8]) -> Result<()> {
        self.add_data_entry(EntryKind::Image, name, metadata, None, data)
    }

    pub fn add_directory(&mut self, name: &str, metadata: Metadata) -> Result<()> {
        let crypt = self.options.crypt.entry_params();
        self.flush_entry_chunk(chunk::DIR0, name, &metadata, &crypt, None, None, &[])
    }

    pub fn add_link(&mut self, name: &str, metadata: Metadata, target: &str) -> Result<()> {
        let crypt = self.options.crypt.entry_params();
        self.flush_entry_chunk(chunk::LINK, name, &metadata, &crypt, None, Some(target), &[])
    }

    pub fn add_hardlink(&mut self, name: &str, metadata: Metadata, target: &str) -> Result<()> {
        let crypt = self.options.crypt.entry_params();
        self.flush_entry_chunk(chunk::HLNK, name, &metadata, &crypt, None, Some(target), &[])
    }

    pub fn add_special(&mut self, name: &str, metadata: Metadata, kind: SpecialKind) -> Result<()> {
        let crypt = self.options.crypt.entry_params();
        self.flush_entry_chunk(chunk::SPEC, name, &metadata, &crypt, Some(kind), None, &[])
    }

    /// Finalize the last open volume (even if empty, so a zero-entry
    /// archive still produces one valid `BAR0`) and return every
    /// produced storage name in write order. Consumes the incremental
    /// list's update, if any, by returning it for the caller to persist.
    pub fn close(mut self) -> Result<(Vec<String>, Option<IncrementalList>)> {
        if !self.closed {
            self.finalize_current_volume()?;
            self.closed = true;
        }
        Ok((std::mem::take(&mut self.produced_storages), self.incremental_list.take()))
    }
}
