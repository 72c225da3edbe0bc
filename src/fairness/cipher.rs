//! At-rest protection for server seeds.
//!
//! Sealed form is `hex(nonce(12) || ChaCha20-Poly1305 ciphertext)`.

use crate::errors::{DiceError, DiceResult};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand_core::{OsRng, RngCore};
use std::fmt;

const NONCE_LEN: usize = 12;

/// Process-wide seed cipher, built from the configured key
#[derive(Clone)]
pub struct SeedCipher {
    cipher: ChaCha20Poly1305,
}

impl SeedCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        }
    }

    /// Encrypt a plaintext seed under a fresh random nonce
    pub fn seal(&self, plaintext: &str) -> DiceResult<String> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| DiceError::Encryption(format!("encrypt: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(hex::encode(sealed))
    }

    /// Decrypt a sealed seed; fails on tampering or a wrong key
    pub fn open(&self, sealed: &str) -> DiceResult<String> {
        let bytes = hex::decode(sealed).map_err(|e| DiceError::Encryption(format!("sealed seed hex: {}", e)))?;
        if bytes.len() <= NONCE_LEN {
            return Err(DiceError::Encryption("sealed seed too short".to_string()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| DiceError::Encryption("decrypt failed".to_string()))?;

        String::from_utf8(plaintext).map_err(|e| DiceError::Encryption(format!("seed is not utf-8: {}", e)))
    }
}

impl fmt::Debug for SeedCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SeedCipher(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_hides_plaintext() {
        let cipher = SeedCipher::new([7u8; 32]);
        let sealed = cipher.seal("my-server-seed").unwrap();
        assert!(!sealed.contains(&hex::encode("my-server-seed")));
        assert_eq!(cipher.open(&sealed).unwrap(), "my-server-seed");
    }

    #[test]
    fn test_same_plaintext_seals_differently() {
        let cipher = SeedCipher::new([7u8; 32]);
        assert_ne!(cipher.seal("seed").unwrap(), cipher.seal("seed").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = SeedCipher::new([1u8; 32]).seal("seed").unwrap();
        assert!(matches!(
            SeedCipher::new([2u8; 32]).open(&sealed),
            Err(DiceError::Encryption(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = SeedCipher::new([3u8; 32]);
        let mut sealed = hex::decode(cipher.seal("seed").unwrap()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(cipher.open(&hex::encode(sealed)).is_err());
        assert!(cipher.open("abcd").is_err());
    }
}
