//! CBC-mode block cipher dispatch for the eight symmetric algorithms.
//! Every encrypted payload is laid out as
//! `iv (block_len bytes) || ciphertext (PKCS7-padded)`, mirroring
//! `sixcy::crypto`'s "nonce prepended to ciphertext" layout, generalized
//! from a single fixed AEAD cipher to CBC mode (see the module doc in
//! `crypt::mod` for why CBC rather than an AEAD mode here).

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use super::{Algorithm, CryptError};

macro_rules! cbc_pair {
    ($cipher:ty) => {
        (
            |key: &[u8], iv: &[u8], data: &[u8]| -> Vec<u8> {
                cbc::Encryptor::<$cipher>::new_from_slices(key, iv)
                    .expect("key/iv length validated by Algorithm::key_len/block_len")
                    .encrypt_padded_vec_mut::<Pkcs7>(data)
            },
            |key: &[u8], iv: &[u8], data: &[u8]| -> Result<Vec<u8>, CryptError> {
                cbc::Decryptor::<$cipher>::new_from_slices(key, iv)
                    .map_err(|_| CryptError::DecryptionFailed)?
                    .decrypt_padded_vec_mut::<Pkcs7>(data)
                    .map_err(|_| CryptError::DecryptionFailed)
            },
        )
    };
}

fn encrypt_block(algorithm: Algorithm, key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
    match algorithm {
        Algorithm::ThreeDes => cbc_pair!(des::TdesEde3).0(key, iv, data),
        Algorithm::Cast5 => cbc_pair!(cast5::Cast5).0(key, iv, data),
        Algorithm::Blowfish => cbc_pair!(blowfish::Blowfish).0(key, iv, data),
        Algorithm::Aes128 => cbc_pair!(aes::Aes128).0(key, iv, data),
        Algorithm::Aes192 => cbc_pair!(aes::Aes192).0(key, iv, data),
        Algorithm::Aes256 => cbc_pair!(aes::Aes256).0(key, iv, data),
        Algorithm::Twofish128 => cbc_pair!(twofish::Twofish).0(key, iv, data),
        Algorithm::Twofish256 => cbc_pair!(twofish::Twofish).0(key, iv, data),
    }
}

fn decrypt_block(algorithm: Algorithm, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptError> {
    match algorithm {
        Algorithm::ThreeDes => cbc_pair!(des::TdesEde3).1(key, iv, data),
        Algorithm::Cast5 => cbc_pair!(cast5::Cast5).1(key, iv, data),
        Algorithm::Blowfish => cbc_pair!(blowfish::Blowfish).1(key, iv, data),
        Algorithm::Aes128 => cbc_pair!(aes::Aes128).1(key, iv, data),
        Algorithm::Aes192 => cbc_pair!(aes::Aes192).1(key, iv, data),
        Algorithm::Aes256 => cbc_pair!(aes::Aes256).1(key, iv, data),
        Algorithm::Twofish128 => cbc_pair!(twofish::Twofish).1(key, iv, data),
        Algorithm::Twofish256 => cbc_pair!(twofish::Twofish).1(key, iv, data),
    }
}

pub fn encrypt(algorithm: Algorithm, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptError> {
    debug_assert_eq!(key.len(), algorithm.key_len());
    if plaintext.is_empty() {
        // Empty payloads are encoded as zero-length and are not encrypted.
        return Ok(Vec::new());
    }
    let block_len = algorithm.block_len();
    let mut iv = vec![0u8; block_len];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = encrypt_block(algorithm, key, &iv, plaintext);
    let mut out = Vec::with_capacity(block_len + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn decrypt(algorithm: Algorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptError> {
    debug_assert_eq!(key.len(), algorithm.key_len());
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let block_len = algorithm.block_len();
    if data.len() < block_len {
        return Err(CryptError::DecryptionFailed);
    }
    let (iv, ciphertext) = data.split_at(block_len);
    decrypt_block(algorithm, key, iv, ciphertext)
}
