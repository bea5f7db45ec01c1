//! Archive signing.
//!
//! # Signing Process
//!
//! ```text
//! 1. Builder stages the payload and computes digest = SHA256(JCS(checksums))
//! 2. PAE = DSSEv1_PAE(PAYLOAD_TYPE, digest bytes)
//! 3. signature = ed25519_sign(private_key, PAE)
//! 4. SignatureBlock { digest, key_id, signature, cert_chain (leaf first) }
//! 5. Builder appends signature.json after the payload and seals the archive
//! ```
//!
//! The block carries the full chain, so verification needs nothing beyond
//! the trust store.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer as _, SigningKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cert::Certificate;
use crate::crypto::keys;
use crate::crypto::PayloadDigest;
use crate::error::SigningError;
use crate::spec::{SigningRequest, Specification};

/// Payload type bound into every signature.
pub const PAYLOAD_TYPE: &str = "application/vnd.bale.payload-digest;v=1";

pub const SIGNATURE_VERSION: u32 = 1;

pub const SIGNATURE_ALGORITHM: &str = "ed25519";

/// Detached signature embedded in an archive as `signature.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    pub version: u32,
    pub algorithm: String,
    pub payload_type: String,
    /// `sha256:<hex>` payload digest that was signed.
    pub digest: String,
    /// Key id of the leaf certificate's key.
    pub key_id: String,
    /// Base64 Ed25519 signature over PAE(payload_type, digest).
    pub signature: String,
    /// Leaf first.
    pub cert_chain: Vec<Certificate>,
    pub signed_at: DateTime<Utc>,
}

impl SignatureBlock {
    pub fn leaf(&self) -> Option<&Certificate> {
        self.cert_chain.first()
    }
}

/// Build DSSE Pre-Authentication Encoding (PAE).
///
/// ```text
/// PAE(type, payload) = "DSSEv1" SP LEN(type) SP type SP LEN(payload) SP payload
/// ```
pub fn build_pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let type_len = payload_type.len().to_string();
    let payload_len = payload.len().to_string();

    let mut pae = Vec::with_capacity(16 + payload_type.len() + payload.len());
    pae.extend_from_slice(b"DSSEv1 ");
    pae.extend_from_slice(type_len.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_type.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_len.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload);
    pae
}

/// Sign a payload digest with `key`, embedding `chain` (leaf first).
pub fn sign(
    digest: &PayloadDigest,
    key: &SigningKey,
    chain: &[Certificate],
) -> Result<SignatureBlock, SigningError> {
    sign_at(digest, key, chain, Utc::now())
}

/// [`sign`] with an explicit signing time.
pub fn sign_at(
    digest: &PayloadDigest,
    key: &SigningKey,
    chain: &[Certificate],
    at: DateTime<Utc>,
) -> Result<SignatureBlock, SigningError> {
    let leaf = chain.first().ok_or(SigningError::ChainEmpty)?;

    let key_mismatch = || SigningError::KeyMismatch {
        key_id: keys::key_id(&key.verifying_key()).unwrap_or_else(|_| "unknown".to_string()),
        subject: leaf.subject.clone(),
    };
    if leaf.public_key().ok() != Some(key.verifying_key()) {
        return Err(key_mismatch());
    }
    let key_id = leaf.key_id().map_err(|_| key_mismatch())?;

    if !leaf.is_valid_at(at) {
        return Err(SigningError::CertificateExpired {
            subject: leaf.subject.clone(),
            at,
            not_before: leaf.not_before,
            not_after: leaf.not_after,
        });
    }

    let signature = key.sign(&build_pae(PAYLOAD_TYPE, digest.as_bytes()));
    debug!(%digest, key_id = %key_id, subject = %leaf.subject, "signed payload digest");

    Ok(SignatureBlock {
        version: SIGNATURE_VERSION,
        algorithm: SIGNATURE_ALGORITHM.to_string(),
        payload_type: PAYLOAD_TYPE.to_string(),
        digest: digest.to_string(),
        key_id,
        signature: BASE64.encode(signature.to_bytes()),
        cert_chain: chain.to_vec(),
        signed_at: at,
    })
}

/// Private key plus certificate chain, loaded from a spec's signing request.
pub struct Signer {
    key: SigningKey,
    chain: Vec<Certificate>,
}

impl Signer {
    pub fn new(key: SigningKey, chain: Vec<Certificate>) -> Result<Self, SigningError> {
        if chain.is_empty() {
            return Err(SigningError::ChainEmpty);
        }
        Ok(Self { key, chain })
    }

    /// Load key and certificates, resolving paths against the spec's base dir.
    pub fn load(request: &SigningRequest, spec: &Specification) -> Result<Self, SigningError> {
        let key = keys::load_private_key_pem(&spec.resolve(&request.key))?;
        if request.chain.is_empty() {
            return Err(SigningError::ChainEmpty);
        }

        let chain = request
            .chain
            .iter()
            .map(|rel| {
                let path = spec.resolve(rel);
                Certificate::load(&path).map_err(|e| SigningError::CertificateUnreadable {
                    path,
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(key, chain)
    }

    pub fn leaf(&self) -> &Certificate {
        &self.chain[0]
    }

    pub fn sign(&self, digest: &PayloadDigest) -> Result<SignatureBlock, SigningError> {
        sign(digest, &self.key, &self.chain)
    }
}
