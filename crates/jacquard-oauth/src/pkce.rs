//! RFC 7636 PKCE code verifier/challenge generation and verification.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jacquard_common::CowStr;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Default verifier length in bytes of entropy before base64url encoding.
///
/// RFC 7636 requires the base64url-encoded verifier to be 43-128 characters;
/// 96 raw bytes encodes to 128 characters, the maximum allowed.
pub const DEFAULT_VERIFIER_BYTES: usize = 96;
const MIN_VERIFIER_LEN: usize = 43;
const MAX_VERIFIER_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum Error {
    #[error("verifier length {0} is outside the allowed range {MIN_VERIFIER_LEN}-{MAX_VERIFIER_LEN}")]
    InvalidLength(usize),
    #[error("code verifier does not match challenge")]
    Mismatch,
}

pub type Result<T> = core::result::Result<T, Error>;

/// Generate a PKCE code verifier using `len` bytes of randomness (base64url encoded).
///
/// `len` is the raw byte count, not the encoded character count; the default
/// ([`DEFAULT_VERIFIER_BYTES`]) produces a verifier at the RFC's maximum length.
pub fn generate_verifier(len: usize) -> CowStr<'static> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes).into()
}

/// Derive the S256 code challenge for a given verifier.
pub fn challenge_for_verifier(verifier: &str) -> CowStr<'static> {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())).into()
}

/// Generate a verifier/challenge pair (S256 only, per §4.3's hard requirement).
pub fn generate_pair(len: usize) -> (CowStr<'static>, CowStr<'static>) {
    let verifier = generate_verifier(len);
    let challenge = challenge_for_verifier(&verifier);
    (challenge, verifier)
}

/// Verify that `verifier` hashes to `challenge` (constant-time comparison of the digest).
pub fn verify(verifier: &str, challenge: &str) -> Result<()> {
    if verifier.len() < MIN_VERIFIER_LEN || verifier.len() > MAX_VERIFIER_LEN {
        return Err(Error::InvalidLength(verifier.len()));
    }
    let expected = challenge_for_verifier(verifier);
    let ok = expected.as_bytes().ct_eq_like(challenge.as_bytes());
    if ok { Ok(()) } else { Err(Error::Mismatch) }
}

trait CtEq {
    fn ct_eq_like(&self, other: &[u8]) -> bool;
}

impl CtEq for [u8] {
    fn ct_eq_like(&self, other: &[u8]) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut diff = 0u8;
        for (a, b) in self.iter().zip(other.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let (challenge, verifier) = generate_pair(DEFAULT_VERIFIER_BYTES);
        assert!(verify(&verifier, &challenge).is_ok());
    }

    #[test]
    fn wrong_verifier_fails() {
        let (challenge, _verifier) = generate_pair(DEFAULT_VERIFIER_BYTES);
        let other = generate_verifier(DEFAULT_VERIFIER_BYTES);
        assert!(verify(&other, &challenge).is_err());
    }

    #[test]
    fn length_bounds() {
        assert!(verify("short", "whatever").is_err());
    }
}
