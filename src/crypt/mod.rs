//! Crypt pipeline: symmetric (passphrase + PBKDF2) and asymmetric
//! (per-archive random key wrapped with an RSA public key) encryption of
//! fragment payloads, applied after compression.
//!
//! Shaped after `sixcy::crypto` (derive a key, `encrypt`/`decrypt` a
//! buffer, store algorithm identity in-band) but generalized from a
//! single fixed AES-256-GCM cipher to a wider algorithm table, run in
//! CBC mode rather than an AEAD mode: the per-chunk layout carries the
//! algorithm id and salt/IV in-band and relies on the archive's own
//! fragment hash (not a cipher tag) for integrity, so a non-AEAD mode
//! composes cleanly with that design.

pub mod asymmetric;
pub mod passphrase;
pub mod symmetric;

use thiserror::Error;

pub use passphrase::Passphrase;

#[derive(Error, Debug)]
pub enum CryptError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed — wrong password or corrupted data")]
    DecryptionFailed,
    #[error("no password available to decrypt this chunk")]
    NoPasswordAvailable,
    #[error("no private key available to unwrap the archive key")]
    NoPasswordOrKey,
    #[error("unsupported crypt algorithm id {0}")]
    UnsupportedAlgorithm(u8),
    #[error("RSA key operation failed: {0}")]
    Rsa(String),
}

/// Crypt-type discriminant, carried in-band per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptType {
    Symmetric,
    Asymmetric,
}

/// Symmetric cipher identity. Every encrypted chunk carries this id
/// in-band; the decrypter never infers it from external configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    ThreeDes,
    Cast5,
    Blowfish,
    Aes128,
    Aes192,
    Aes256,
    Twofish128,
    Twofish256,
}

impl Algorithm {
    pub fn id(self) -> u8 {
        match self {
            Algorithm::ThreeDes => 1,
            Algorithm::Cast5 => 2,
            Algorithm::Blowfish => 3,
            Algorithm::Aes128 => 4,
            Algorithm::Aes192 => 5,
            Algorithm::Aes256 => 6,
            Algorithm::Twofish128 => 7,
            Algorithm::Twofish256 => 8,
        }
    }

    pub fn from_id(id: u8) -> Result<Self, CryptError> {
        Ok(match id {
            1 => Algorithm::ThreeDes,
            2 => Algorithm::Cast5,
            3 => Algorithm::Blowfish,
            4 => Algorithm::Aes128,
            5 => Algorithm::Aes192,
            6 => Algorithm::Aes256,
            7 => Algorithm::Twofish128,
            8 => Algorithm::Twofish256,
            other => return Err(CryptError::UnsupportedAlgorithm(other)),
        })
    }

    pub fn key_len(self) -> usize {
        match self {
            Algorithm::ThreeDes => 24,
            Algorithm::Cast5 => 16,
            Algorithm::Blowfish => 16,
            Algorithm::Aes128 => 16,
            Algorithm::Aes192 => 24,
            Algorithm::Aes256 => 32,
            Algorithm::Twofish128 => 16,
            Algorithm::Twofish256 => 32,
        }
    }

    pub fn block_len(self) -> usize {
        match self {
            Algorithm::ThreeDes | Algorithm::Cast5 | Algorithm::Blowfish => 8,
            Algorithm::Aes128 | Algorithm::Aes192 | Algorithm::Aes256 => 16,
            Algorithm::Twofish128 | Algorithm::Twofish256 => 16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::ThreeDes => "3des",
            Algorithm::Cast5 => "cast5",
            Algorithm::Blowfish => "blowfish",
            Algorithm::Aes128 => "aes-128",
            Algorithm::Aes192 => "aes-192",
            Algorithm::Aes256 => "aes-256",
            Algorithm::Twofish128 => "twofish-128",
            Algorithm::Twofish256 => "twofish-256",
        }
    }
}

/// PBKDF2-HMAC-SHA256 iteration count. Conservative for archive
/// encryption — deliberately slow, in the spirit of Argon2-style
/// parameters, while using the PBKDF2 family.
pub const PBKDF2_ITERATIONS: u32 = 200_000;

/// Derive a symmetric key of the algorithm's required length from a
/// passphrase and a per-archive salt.
pub fn derive_key(passphrase: &Passphrase, salt: &[u8], algorithm: Algorithm) -> Vec<u8> {
    let mut key = vec![0u8; algorithm.key_len()];
    passphrase.deploy(|plaintext| {
        pbkdf2::pbkdf2_hmac::<sha2::Sha256>(plaintext.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    });
    key
}

/// Encrypt `plaintext` under `algorithm` with a random IV prepended to
/// the ciphertext. Empty payloads are never encrypted — callers must
/// check `plaintext.is_empty()` before calling this (the fragment
/// builder in `archive::writer` does so) so there is no ciphertext
/// expansion for empty files.
pub fn encrypt(algorithm: Algorithm, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptError> {
    symmetric::encrypt(algorithm, key, plaintext)
}

pub fn decrypt(algorithm: Algorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptError> {
    symmetric::decrypt(algorithm, key, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_deterministic_given_same_salt() {
        let pass = Passphrase::new("correct horse battery staple");
        let salt = b"0123456789abcdef";
        let k1 = derive_key(&pass, salt, Algorithm::Aes256);
        let k2 = derive_key(&pass, salt, Algorithm::Aes256);
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 32);
    }

    #[test]
    fn derive_key_differs_by_salt() {
        let pass = Passphrase::new("hunter2");
        let k1 = derive_key(&pass, b"saltsaltsaltsalt", Algorithm::Aes128);
        let k2 = derive_key(&pass, b"differentsalt!!!", Algorithm::Aes128);
        assert_ne!(k1, k2);
    }

    #[test]
    fn every_algorithm_round_trips() {
        let algorithms = [
            Algorithm::ThreeDes,
            Algorithm::Cast5,
            Algorithm::Blowfish,
            Algorithm::Aes128,
            Algorithm::Aes192,
            Algorithm::Aes256,
            Algorithm::Twofish128,
            Algorithm::Twofish256,
        ];
        for algorithm in algorithms {
            let key = vec![0x42u8; algorithm.key_len()];
            let plaintext = b"some archive fragment payload bytes, not block aligned";
            let ciphertext = encrypt(algorithm, &key, plaintext).unwrap();
            let decrypted = decrypt(algorithm, &key, &ciphertext).unwrap();
            assert_eq!(decrypted, plaintext, "{algorithm:?}");
        }
    }

    #[test]
    fn wrong_key_fails_integrity_check() {
        let key = vec![1u8; Algorithm::Aes256.key_len()];
        let wrong_key = vec![2u8; Algorithm::Aes256.key_len()];
        let ciphertext = encrypt(Algorithm::Aes256, &key, b"top secret").unwrap();
        // CBC without a MAC can't always detect a wrong key via padding,
        // but a wrong key over enough blocks will corrupt padding with
        // overwhelming probability; assert the common case here and treat
        // padding validity as the integrity check: the reader advances
        // to the next password candidate when this fails.
        let result = decrypt(Algorithm::Aes256, &wrong_key, &ciphertext);
        assert!(result.is_err() || result.unwrap() != b"top secret");
    }
}
