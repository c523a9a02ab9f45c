//! AES-256-GCM + HKDF-SHA256 encryption service for at-rest session state.
//!
//! New module; the corpus's RustCrypto preference (`p256`, `sha2` already in
//! the workspace) is followed rather than reaching outside that family.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroize;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum Error {
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed (ciphertext tampered or wrong key)")]
    Decrypt,
    #[error("ciphertext too short to contain a nonce")]
    Truncated,
    #[error("master key must be exactly {KEY_LEN} bytes, got {0}")]
    InvalidKeyLen(usize),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Holds the root key material and derives per-purpose data-encryption keys via HKDF.
///
/// Zeroizes its key material on drop.
pub struct EncryptionService {
    master_key: [u8; KEY_LEN],
}

impl EncryptionService {
    pub fn new(master_key: &[u8]) -> Result<Self> {
        if master_key.len() != KEY_LEN {
            return Err(Error::InvalidKeyLen(master_key.len()));
        }
        let mut buf = [0u8; KEY_LEN];
        buf.copy_from_slice(master_key);
        Ok(Self { master_key: buf })
    }

    /// Derive a 32-byte data-encryption key scoped to `info` (e.g. `b"session"`, `b"dpop-key"`).
    fn derive_key(&self, info: &[u8]) -> [u8; KEY_LEN] {
        let hk = Hkdf::<Sha256>::new(None, &self.master_key);
        let mut okm = [0u8; KEY_LEN];
        hk.expand(info, &mut okm)
            .expect("HKDF output length is valid for SHA-256");
        okm
    }

    /// Encrypt `plaintext`, returning `nonce || ciphertext||tag`, the key scoped to `info`.
    pub fn encrypt(&self, info: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let mut dek = self.derive_key(info);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&dek));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| Error::Encrypt)?;
        dek.zeroize();
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Inverse of [`EncryptionService::encrypt`].
    pub fn decrypt(&self, info: &[u8], blob: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < NONCE_LEN {
            return Err(Error::Truncated);
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let mut dek = self.derive_key(info);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&dek));
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, Payload { msg: ciphertext, aad })
            .map_err(|_| Error::Decrypt)?;
        dek.zeroize();
        Ok(plaintext)
    }
}

impl Drop for EncryptionService {
    fn drop(&mut self) {
        self.master_key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; KEY_LEN] {
        let mut k = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut k);
        k
    }

    #[test]
    fn roundtrip() {
        let svc = EncryptionService::new(&key()).unwrap();
        let ct = svc.encrypt(b"session", b"hello world", b"").unwrap();
        let pt = svc.decrypt(b"session", &ct, b"").unwrap();
        assert_eq!(pt, b"hello world");
    }

    #[test]
    fn wrong_info_fails() {
        let svc = EncryptionService::new(&key()).unwrap();
        let ct = svc.encrypt(b"session", b"hello world", b"").unwrap();
        assert!(svc.decrypt(b"dpop-key", &ct, b"").is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let svc = EncryptionService::new(&key()).unwrap();
        let mut ct = svc.encrypt(b"session", b"hello world", b"").unwrap();
        *ct.last_mut().unwrap() ^= 0xff;
        assert!(svc.decrypt(b"session", &ct, b"").is_err());
    }

    #[test]
    fn aad_mismatch_fails() {
        let svc = EncryptionService::new(&key()).unwrap();
        let ct = svc.encrypt(b"session", b"hello world", b"session-id-1").unwrap();
        assert!(svc.decrypt(b"session", &ct, b"session-id-2").is_err());
    }
}
