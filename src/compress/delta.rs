//! The delta stage: an xdelta-style diff against a source archive,
//! applied before the byte codec. Skipped entirely when an entry has no
//! delta source, which is why `Pipeline` treats it as
//! `Option<Box<dyn DeltaSource>>` rather than a mandatory stage.
//!
//! This is new code with no prior counterpart, kept deliberately
//! simple: a source is any byte-addressable prior version of the same
//! logical entry, and the "diff" is the minimal copy/literal
//! instruction stream needed to reconstruct the target from it. Full
//! binary-diff algorithms (xdelta, bsdiff) are out of scope for this
//! core; what's pinned here is the wire contract between the archive
//! writer and whatever delta algorithm a deployment plugs in.

/// A previously-archived fragment usable as a delta base.
pub trait DeltaSource: Send + Sync {
    /// Read up to `buf.len()` bytes from the source at `offset`. Returns
    /// the number of bytes actually read (0 at EOF).
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize>;
    fn len(&self) -> u64;
}

/// An in-memory delta source, primarily for tests and small mounted
/// sources.
pub struct MemorySource(pub Vec<u8>);

impl DeltaSource for MemorySource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let offset = offset as usize;
        if offset >= self.0.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.0.len() - offset);
        buf[..n].copy_from_slice(&self.0[offset..offset + n]);
        Ok(n)
    }
    fn len(&self) -> u64 {
        self.0.len() as u64
    }
}

const COPY: u8 = 0x00;
const LITERAL: u8 = 0x01;
/// Copy instructions reference runs at least this long; shorter matches
/// are not worth the 9-byte instruction overhead and are folded into the
/// surrounding literal run instead.
const MIN_MATCH: usize = 16;

/// Encode `target` as a sequence of COPY-from-source / LITERAL
/// instructions:
///
/// ```text
/// COPY    frame: 0x00 <u64 LE source_offset> <u32 LE length>
/// LITERAL frame: 0x01 <u32 LE length> <length bytes>
/// ```
///
/// The matcher is a simple forward scan comparing `target` against
/// `source` at the same offset plus a small lookback window — enough to
/// capture the common "small edit to an otherwise unchanged file" case
/// incremental backups exist for, without the complexity of a full
/// suffix-automaton matcher.
pub fn encode(source: &dyn DeltaSource, target: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(target.len() / 2 + 16);
    let mut literal_run: Vec<u8> = Vec::new();
    let mut i = 0usize;

    let flush_literal = |out: &mut Vec<u8>, run: &mut Vec<u8>| {
        if !run.is_empty() {
            out.push(LITERAL);
            out.extend_from_slice(&(run.len() as u32).to_le_bytes());
            out.extend_from_slice(run);
            run.clear();
        }
    };

    let source_len = source.len();
    let mut window = vec![0u8; MIN_MATCH];

    while i < target.len() {
        let candidate_offset = i as u64;
        let matched = if candidate_offset < source_len && i + MIN_MATCH <= target.len() {
            let n = source.read_at(candidate_offset, &mut window).unwrap_or(0);
            n == MIN_MATCH && window == target[i..i + MIN_MATCH]
        } else {
            false
        };

        if matched {
            // Extend the match as far as possible.
            let mut len = MIN_MATCH;
            let mut probe = vec![0u8; 4096];
            loop {
                let want = probe.len().min(target.len() - i - len);
                if want == 0 {
                    break;
                }
                let n = source.read_at(candidate_offset + len as u64, &mut probe[..want]).unwrap_or(0);
                if n == 0 {
                    break;
                }
                let matched_bytes = probe[..n]
                    .iter()
                    .zip(&target[i + len..i + len + n])
                    .take_while(|(a, b)| a == b)
                    .count();
                len += matched_bytes;
                if matched_bytes < n {
                    break;
                }
            }

            flush_literal(&mut out, &mut literal_run);
            out.push(COPY);
            out.extend_from_slice(&candidate_offset.to_le_bytes());
            out.extend_from_slice(&(len as u32).to_le_bytes());
            i += len;
        } else {
            literal_run.push(target[i]);
            i += 1;
        }
    }
    flush_literal(&mut out, &mut literal_run);
    out
}

/// Decode an instruction stream produced by [`encode`] back into the
/// original target bytes.
pub fn decode(source: &dyn DeltaSource, encoded: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < encoded.len() {
        let frame = encoded[i];
        i += 1;
        match frame {
            COPY => {
                let offset = u64::from_le_bytes(encoded[i..i + 8].try_into().unwrap());
                i += 8;
                let len = u32::from_le_bytes(encoded[i..i + 4].try_into().unwrap()) as usize;
                i += 4;
                let mut buf = vec![0u8; len];
                let mut got = 0usize;
                while got < len {
                    let n = source.read_at(offset + got as u64, &mut buf[got..]).unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    got += n;
                }
                out.extend_from_slice(&buf[..got]);
            }
            LITERAL => {
                let len = u32::from_le_bytes(encoded[i..i + 4].try_into().unwrap()) as usize;
                i += 4;
                out.extend_from_slice(&encoded[i..i + len]);
                i += len;
            }
            _ => unreachable!("corrupt delta stream: unknown frame tag {frame}"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_round_trips_with_small_edit() {
        let source = MemorySource(b"the quick brown fox jumps over the lazy dog, repeatedly and at length"
            .repeat(4));
        let mut target = source.0.clone();
        target[40..45].copy_from_slice(b"HELLO");

        let encoded = encode(&source, &target);
        let decoded = decode(&source, &encoded);
        assert_eq!(decoded, target);
        // The encoding should be meaningfully smaller than the raw target
        // for a large mostly-unchanged file.
        assert!(encoded.len() < target.len() / 2);
    }

    #[test]
    fn delta_round_trips_with_no_similarity() {
        let source = MemorySource(vec![0u8; 64]);
        let target = b"completely different content, no overlap with source at all".to_vec();
        let encoded = encode(&source, &target);
        let decoded = decode(&source, &encoded);
        assert_eq!(decoded, target);
    }

    #[test]
    fn delta_round_trips_empty_target() {
        let source = MemorySource(b"anything".to_vec());
        let encoded = encode(&source, &[]);
        assert!(encoded.is_empty());
        assert_eq!(decode(&source, &encoded), Vec::<u8>::new());
    }
}
