//! Ed25519 key encoding.
//!
//! Private keys live on disk as PKCS#8 PEM. Public keys are carried inside
//! certificates as base64 SPKI DER; a key id is `sha256:<hex>` of that DER.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::SigningError;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid base64 public key: {0}")]
    Base64(String),

    #[error("invalid SPKI public key: {0}")]
    Spki(String),

    #[error("failed to encode key: {0}")]
    Encode(String),
}

/// Generate a fresh Ed25519 signing key.
pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut rand::thread_rng())
}

/// Load a PKCS#8 PEM private key from disk.
pub fn load_private_key_pem(path: &Path) -> Result<SigningKey, SigningError> {
    use pkcs8::DecodePrivateKey;

    let pem = fs::read_to_string(path).map_err(|e| SigningError::KeyUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    SigningKey::from_pkcs8_pem(&pem).map_err(|e| SigningError::KeyUnreadable {
        path: path.to_path_buf(),
        reason: format!("failed to parse private key PEM: {e}"),
    })
}

/// Encode a private key as PKCS#8 PEM (LF line endings).
pub fn private_key_to_pem(key: &SigningKey) -> Result<String, KeyError> {
    use pkcs8::{EncodePrivateKey, LineEnding};

    key.to_pkcs8_pem(LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| KeyError::Encode(e.to_string()))
}

/// SPKI DER bytes of a public key.
pub fn public_key_der(key: &VerifyingKey) -> Result<Vec<u8>, KeyError> {
    use pkcs8::EncodePublicKey;

    key.to_public_key_der()
        .map(|doc| doc.as_bytes().to_vec())
        .map_err(|e| KeyError::Encode(e.to_string()))
}

/// Base64 SPKI DER of a public key, as embedded in certificates.
pub fn encode_public_key(key: &VerifyingKey) -> Result<String, KeyError> {
    Ok(BASE64.encode(public_key_der(key)?))
}

/// Decode a base64 SPKI public key.
pub fn decode_public_key(b64: &str) -> Result<VerifyingKey, KeyError> {
    use pkcs8::DecodePublicKey;

    let bytes = BASE64
        .decode(b64)
        .map_err(|e| KeyError::Base64(e.to_string()))?;
    VerifyingKey::from_public_key_der(&bytes).map_err(|e| KeyError::Spki(e.to_string()))
}

/// Compute key_id from SPKI-encoded public key bytes.
pub fn compute_key_id(spki_bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(spki_bytes)))
}

/// Compute key_id from a VerifyingKey.
pub fn key_id(key: &VerifyingKey) -> Result<String, KeyError> {
    Ok(compute_key_id(&public_key_der(key)?))
}
