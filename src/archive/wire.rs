//! Field-level binary encoding shared by the writer and reader for entry
//! metadata and crypt parameters. Everything here is little-endian,
//! matching the chunk header convention in `chunk.rs`.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::crypt::{Algorithm as CryptAlgorithm, CryptType};

use super::entry::{CryptParams, Metadata, SpecialKind};

pub fn write_str(w: &mut impl Write, s: &str) -> io::Result<()> {
    w.write_u16::<LittleEndian>(s.len() as u16)?;
    w.write_all(s.as_bytes())
}

pub fn read_str(r: &mut impl Read) -> io::Result<String> {
    let len = r.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

fn write_option_str(w: &mut impl Write, s: Option<&str>) -> io::Result<()> {
    match s {
        Some(s) => {
            w.write_u8(1)?;
            write_str(w, s)
        }
        None => w.write_u8(0),
    }
}

fn read_option_str(r: &mut impl Read) -> io::Result<Option<String>> {
    Ok(if r.read_u8()? == 1 { Some(read_str(r)?) } else { None })
}

fn write_option_u32(w: &mut impl Write, v: Option<u32>) -> io::Result<()> {
    match v {
        Some(v) => {
            w.write_u8(1)?;
            w.write_u32::<LittleEndian>(v)
        }
        None => w.write_u8(0),
    }
}

fn read_option_u32(r: &mut impl Read) -> io::Result<Option<u32>> {
    Ok(if r.read_u8()? == 1 { Some(r.read_u32::<LittleEndian>()?) } else { None })
}

pub fn write_metadata(w: &mut impl Write, m: &Metadata) -> io::Result<()> {
    w.write_u64::<LittleEndian>(m.size)?;
    w.write_i64::<LittleEndian>(m.mtime)?;
    w.write_i64::<LittleEndian>(m.atime)?;
    w.write_i64::<LittleEndian>(m.ctime)?;
    w.write_u32::<LittleEndian>(m.uid)?;
    w.write_u32::<LittleEndian>(m.gid)?;
    w.write_u32::<LittleEndian>(m.mode)?;
    write_option_u32(w, m.major)?;
    write_option_u32(w, m.minor)?;
    write_option_str(w, m.filesystem_type.as_deref())?;
    Ok(())
}

pub fn read_metadata(r: &mut impl Read) -> io::Result<Metadata> {
    Ok(Metadata {
        size: r.read_u64::<LittleEndian>()?,
        mtime: r.read_i64::<LittleEndian>()?,
        atime: r.read_i64::<LittleEndian>()?,
        ctime: r.read_i64::<LittleEndian>()?,
        uid: r.read_u32::<LittleEndian>()?,
        gid: r.read_u32::<LittleEndian>()?,
        mode: r.read_u32::<LittleEndian>()?,
        major: read_option_u32(r)?,
        minor: read_option_u32(r)?,
        filesystem_type: read_option_str(r)?,
    })
}

pub fn write_crypt_params(w: &mut impl Write, crypt: Option<&CryptParams>) -> io::Result<()> {
    match crypt {
        None => w.write_u8(0),
        Some(c) => {
            w.write_u8(1)?;
            w.write_u8(c.algorithm.id())?;
            w.write_u8(match c.crypt_type {
                CryptType::Symmetric => 0,
                CryptType::Asymmetric => 1,
            })?;
            match c.salt {
                Some(salt) => {
                    w.write_u8(1)?;
                    w.write_all(&salt)
                }
                None => w.write_u8(0),
            }
        }
    }
}

pub fn read_crypt_params(r: &mut impl Read) -> io::Result<Option<CryptParams>> {
    if r.read_u8()? == 0 {
        return Ok(None);
    }
    let algorithm_id = r.read_u8()?;
    let algorithm = CryptAlgorithm::from_id(algorithm_id)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    let crypt_type = match r.read_u8()? {
        0 => CryptType::Symmetric,
        1 => CryptType::Asymmetric,
        other => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown crypt type tag {other}"))),
    };
    let salt = if r.read_u8()? == 1 {
        let mut salt = [0u8; 16];
        r.read_exact(&mut salt)?;
        Some(salt)
    } else {
        None
    };
    Ok(Some(CryptParams { algorithm, crypt_type, salt }))
}

pub fn write_special_kind(w: &mut impl Write, kind: Option<SpecialKind>) -> io::Result<()> {
    w.write_u8(match kind {
        None => 0,
        Some(SpecialKind::CharDevice) => 1,
        Some(SpecialKind::BlockDevice) => 2,
        Some(SpecialKind::Fifo) => 3,
        Some(SpecialKind::Socket) => 4,
    })
}

pub fn read_special_kind(r: &mut impl Read) -> io::Result<Option<SpecialKind>> {
    Ok(match r.read_u8()? {
        0 => None,
        1 => Some(SpecialKind::CharDevice),
        2 => Some(SpecialKind::BlockDevice),
        3 => Some(SpecialKind::Fifo),
        4 => Some(SpecialKind::Socket),
        other => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown special kind tag {other}"))),
    })
}
