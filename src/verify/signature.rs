//! Ed25519 detached signatures over artifacts (tier 1)
//!
//! Two encodings are accepted for both keys and signatures:
//! - raw: base64 of the 32-byte key / 64-byte signature
//! - minisign: base64 of `Ed` + 8-byte key id + key/signature, optionally
//!   preceded by an `untrusted comment:` line. Signature files may carry a
//!   `trusted comment:` line and a global signature over it, which is checked
//!   when present.
//!
//! Prehashed minisign signatures (`ED`) sign a BLAKE2b digest of the file and
//! are reported as [`SigningError::Unsupported`].

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Signature algorithm identifier
pub const SIGNATURE_ALGORITHM: &str = "Ed25519";

const MINISIGN_LEGACY: &[u8; 2] = b"Ed";
const MINISIGN_PREHASHED: &[u8; 2] = b"ED";
const KEY_ID_LEN: usize = 8;

/// Errors from decoding or checking a signature
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unsupported signature format: {0}")]
    Unsupported(String),

    #[error("signature was made with key {signature}, not {key}")]
    KeyIdMismatch { signature: String, key: String },

    #[error("fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },
}

pub type SigningResult<T> = Result<T, SigningError>;

/// A decoded public key
#[derive(Debug, Clone)]
pub struct PublicKey {
    key: VerifyingKey,
    key_id: Option<[u8; KEY_ID_LEN]>,
}

impl PublicKey {
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }

    pub fn fingerprint(&self) -> String {
        compute_key_fingerprint(&self.key)
    }
}

/// A decoded detached signature
#[derive(Debug, Clone)]
pub struct DetachedSignature {
    signature: Signature,
    key_id: Option<[u8; KEY_ID_LEN]>,
    trusted: Option<TrustedComment>,
}

#[derive(Debug, Clone)]
struct TrustedComment {
    comment: String,
    global: Signature,
}

impl DetachedSignature {
    pub fn trusted_comment(&self) -> Option<&str> {
        self.trusted.as_ref().map(|t| t.comment.as_str())
    }
}

/// Compute the fingerprint (SHA-256 hex) of a public key.
pub fn compute_key_fingerprint(key: &VerifyingKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Encode a public key as raw base64.
pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    BASE64.encode(key.as_bytes())
}

fn payload_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("untrusted comment:"))
}

fn key_id_hex(id: &[u8; KEY_ID_LEN]) -> String {
    // minisign prints key ids as little-endian u64
    let mut bytes = *id;
    bytes.reverse();
    hex::encode_upper(bytes)
}

fn to_key_id(bytes: &[u8]) -> [u8; KEY_ID_LEN] {
    let mut id = [0u8; KEY_ID_LEN];
    id.copy_from_slice(&bytes[..KEY_ID_LEN]);
    id
}

fn to_signature(bytes: &[u8]) -> SigningResult<Signature> {
    let bytes: [u8; 64] = bytes
        .try_into()
        .map_err(|_| SigningError::InvalidSignature("signature must be 64 bytes".to_string()))?;
    Ok(Signature::from_bytes(&bytes))
}

/// Decode a public key (raw or minisign).
pub fn parse_public_key(text: &str) -> SigningResult<PublicKey> {
    let line = payload_lines(text)
        .next()
        .ok_or_else(|| SigningError::InvalidKey("empty key".to_string()))?;
    let bytes = BASE64.decode(line)?;

    let (raw, key_id) = match bytes.len() {
        32 => (&bytes[..], None),
        42 if &bytes[..2] == MINISIGN_LEGACY => (&bytes[2 + KEY_ID_LEN..], Some(to_key_id(&bytes[2..]))),
        42 => {
            return Err(SigningError::Unsupported(format!(
                "public key algorithm {:?}",
                String::from_utf8_lossy(&bytes[..2])
            )))
        }
        n => return Err(SigningError::InvalidKey(format!("unexpected key length {}", n))),
    };

    let raw: [u8; 32] = raw
        .try_into()
        .map_err(|_| SigningError::InvalidKey("key must be 32 bytes".to_string()))?;
    let key = VerifyingKey::from_bytes(&raw).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
    Ok(PublicKey { key, key_id })
}

/// Decode a detached signature (raw or minisign).
pub fn parse_signature(text: &str) -> SigningResult<DetachedSignature> {
    let mut lines = payload_lines(text);
    let line = lines
        .next()
        .ok_or_else(|| SigningError::InvalidSignature("empty signature".to_string()))?;
    let bytes = BASE64.decode(line)?;

    match bytes.len() {
        64 => Ok(DetachedSignature {
            signature: to_signature(&bytes)?,
            key_id: None,
            trusted: None,
        }),
        74 => {
            let algorithm = &bytes[..2];
            if algorithm == MINISIGN_PREHASHED {
                return Err(SigningError::Unsupported(
                    "prehashed minisign signature (ED)".to_string(),
                ));
            }
            if algorithm != MINISIGN_LEGACY {
                return Err(SigningError::Unsupported(format!(
                    "signature algorithm {:?}",
                    String::from_utf8_lossy(algorithm)
                )));
            }
            let signature = to_signature(&bytes[2 + KEY_ID_LEN..])?;

            let trusted = match lines.next().and_then(|l| l.strip_prefix("trusted comment:")) {
                Some(comment) => {
                    let global = lines.next().ok_or_else(|| {
                        SigningError::InvalidSignature("trusted comment without global signature".to_string())
                    })?;
                    Some(TrustedComment {
                        comment: comment.trim_start().to_string(),
                        global: to_signature(&BASE64.decode(global)?)?,
                    })
                }
                None => None,
            };

            Ok(DetachedSignature {
                signature,
                key_id: Some(to_key_id(&bytes[2..])),
                trusted,
            })
        }
        n => Err(SigningError::InvalidSignature(format!(
            "unexpected signature length {}",
            n
        ))),
    }
}

/// Verify `message` against a detached signature.
///
/// Returns `Ok(false)` when the signature does not match; errors mean the
/// inputs could not be checked at all (pinned fingerprint or key id wrong).
pub fn verify_detached(
    message: &[u8],
    signature: &DetachedSignature,
    key: &PublicKey,
    pinned_fingerprint: Option<&str>,
) -> SigningResult<bool> {
    if let Some(expected) = pinned_fingerprint {
        let actual = key.fingerprint();
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(SigningError::FingerprintMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
    }

    if let (Some(sig_id), Some(key_id)) = (&signature.key_id, &key.key_id) {
        if sig_id != key_id {
            return Err(SigningError::KeyIdMismatch {
                signature: key_id_hex(sig_id),
                key: key_id_hex(key_id),
            });
        }
    }

    if key.key.verify(message, &signature.signature).is_err() {
        return Ok(false);
    }

    if let Some(trusted) = &signature.trusted {
        let mut global_message = signature.signature.to_bytes().to_vec();
        global_message.extend_from_slice(trusted.comment.as_bytes());
        if key.key.verify(&global_message, &trusted.global).is_err() {
            return Ok(false);
        }
    }

    Ok(true)
}
