//! Versioned storage envelope: wraps [`crate::crypto::EncryptionService`] with
//! a format byte so future key-rotation/format changes can be detected on read,
//! plus a sensitive-field walker so serialized session records keep non-secret
//! fields (scopes, expiry, DID) legible in storage while encrypting only the
//! token/verifier material.

use serde_json::Value;
use thiserror::Error;

use crate::crypto::EncryptionService;

const ENVELOPE_VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Crypto(#[from] crate::crypto::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),
    #[error("envelope too short")]
    Truncated,
    #[error("path {0} not found in value")]
    PathNotFound(String),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Seal `plaintext` behind a version byte: `[version, ...ciphertext]`.
pub fn seal(service: &EncryptionService, info: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let ciphertext = service.encrypt(info, plaintext, aad)?;
    let mut out = Vec::with_capacity(1 + ciphertext.len());
    out.push(ENVELOPE_VERSION);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of [`seal`].
pub fn open(service: &EncryptionService, info: &[u8], blob: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let Some((&version, ciphertext)) = blob.split_first() else {
        return Err(Error::Truncated);
    };
    if version != ENVELOPE_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    Ok(service.decrypt(info, ciphertext, aad)?)
}

/// Encrypt only the named dotted-path fields of a JSON value in place, replacing
/// each target field with a base64 string of its sealed bytes. Fields not present
/// are skipped silently (records don't all carry every optional sensitive field).
pub fn seal_paths(
    service: &EncryptionService,
    info: &[u8],
    value: &mut Value,
    aad: &[u8],
    paths: &[&str],
) -> Result<()> {
    for path in paths {
        if let Some(slot) = find_path_mut(value, path) {
            let plaintext = serde_json::to_vec(slot)?;
            let sealed = seal(service, info, &plaintext, aad)?;
            *slot = Value::String(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                sealed,
            ));
        }
    }
    Ok(())
}

/// Inverse of [`seal_paths`].
pub fn open_paths(
    service: &EncryptionService,
    info: &[u8],
    value: &mut Value,
    aad: &[u8],
    paths: &[&str],
) -> Result<()> {
    for path in paths {
        if let Some(slot) = find_path_mut(value, path) {
            if let Value::String(encoded) = slot {
                let sealed = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded.as_bytes())
                    .map_err(|_| Error::PathNotFound((*path).to_string()))?;
                let plaintext = open(service, info, &sealed, aad)?;
                *slot = serde_json::from_slice(&plaintext)?;
            }
        }
    }
    Ok(())
}

/// Walk a dotted path (`a.b.c`) through a JSON object tree, returning a mutable
/// reference to the final segment if every intermediate segment is an object.
fn find_path_mut<'v>(value: &'v mut Value, path: &str) -> Option<&'v mut Value> {
    let mut current = value;
    let mut stack: Vec<&str> = path.split('.').collect();
    stack.reverse();
    while let Some(segment) = stack.pop() {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EncryptionService;
    use serde_json::json;

    fn service() -> EncryptionService {
        EncryptionService::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn seal_open_roundtrip() {
        let svc = service();
        let sealed = seal(&svc, b"session", b"plaintext", b"").unwrap();
        assert_eq!(sealed[0], ENVELOPE_VERSION);
        assert_eq!(open(&svc, b"session", &sealed, b"").unwrap(), b"plaintext");
    }

    #[test]
    fn rejects_unknown_version() {
        let svc = service();
        let mut sealed = seal(&svc, b"session", b"plaintext", b"").unwrap();
        sealed[0] = 9;
        assert!(matches!(open(&svc, b"session", &sealed, b""), Err(Error::UnsupportedVersion(9))));
    }

    #[test]
    fn seal_paths_leaves_other_fields_legible() {
        let svc = service();
        let mut value = json!({
            "token_set": { "access_token": "secret-token", "scope": "atproto" },
            "session_id": "abc",
        });
        seal_paths(&svc, b"session", &mut value, b"abc", &["token_set.access_token"]).unwrap();
        assert_eq!(value["token_set"]["scope"], "atproto");
        assert_eq!(value["session_id"], "abc");
        assert!(value["token_set"]["access_token"].as_str().unwrap() != "secret-token");

        open_paths(&svc, b"session", &mut value, b"abc", &["token_set.access_token"]).unwrap();
        assert_eq!(value["token_set"]["access_token"], "secret-token");
    }
}
