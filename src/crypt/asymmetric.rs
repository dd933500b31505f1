//! Asymmetric mode: the archive's per-volume symmetric key is generated
//! at random and wrapped with the recipient's RSA public key instead of
//! being derived from a passphrase. The wrapped key travels in the
//! archive's `KEY0` chunk; only the holder of the matching private key
//! can unwrap it, so a single archive can be both encrypted and
//! decryptable without distributing a shared passphrase.

use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::CryptError;

/// Wrap `symmetric_key` for `public_key`, producing the bytes stored in a
/// `KEY0` chunk.
pub fn wrap_key(public_key: &RsaPublicKey, symmetric_key: &[u8]) -> Result<Vec<u8>, CryptError> {
    public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), symmetric_key)
        .map_err(|e| CryptError::Rsa(e.to_string()))
}

/// Unwrap a `KEY0` chunk's payload with the holder's private key,
/// recovering the symmetric key used for the rest of the archive.
pub fn unwrap_key(private_key: &RsaPrivateKey, wrapped: &[u8]) -> Result<Vec<u8>, CryptError> {
    private_key
        .decrypt(Oaep::new::<Sha256>(), wrapped)
        .map_err(|e| CryptError::Rsa(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;

    #[test]
    fn wrap_then_unwrap_recovers_the_symmetric_key() {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let symmetric_key = vec![0x11u8; 32];

        let wrapped = wrap_key(&public_key, &symmetric_key).unwrap();
        assert_ne!(wrapped, symmetric_key);
        let unwrapped = unwrap_key(&private_key, &wrapped).unwrap();
        assert_eq!(unwrapped, symmetric_key);
    }

    #[test]
    fn unwrap_with_wrong_key_fails() {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let other_private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();

        let wrapped = wrap_key(&public_key, &[0x22u8; 32]).unwrap();
        assert!(unwrap_key(&other_private_key, &wrapped).is_err());
    }
}
