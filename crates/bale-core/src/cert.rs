//! Signer certificates.
//!
//! A certificate binds a subject name to an Ed25519 public key for a validity
//! window, and is signed by its issuer over the JCS form of every field except
//! the signature. A chain is ordered leaf first; each certificate's `issuer`
//! names the next certificate's `subject`.
//!
//! Certificates are stored as JSON:
//!
//! ```json
//! {
//!   "version": 1,
//!   "serial": "9f0c...",
//!   "subject": "release@example.org",
//!   "issuer": "release@example.org",
//!   "public_key": "MCowBQYDK2VwAyEA...",
//!   "not_before": "2026-01-01T00:00:00Z",
//!   "not_after": "2027-01-01T00:00:00Z",
//!   "is_ca": true,
//!   "signature": "base64..."
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, DurationRound, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::crypto::digest::sha256_prefixed;
use crate::crypto::jcs;
use crate::crypto::keys::{self, KeyError};

/// Only supported certificate format version.
pub const CERTIFICATE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("failed to read certificate {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("invalid certificate public key: {0}")]
    Key(#[from] KeyError),

    #[error("invalid certificate signature encoding: {0}")]
    SignatureEncoding(String),

    #[error("certificate encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("unsupported certificate version {0}")]
    UnsupportedVersion(u32),

    #[error("certificate {subject} names issuer {expected}, not {found}")]
    IssuerMismatch {
        subject: String,
        expected: String,
        found: String,
    },

    #[error("certificate {subject} is not signed by {issuer}")]
    BadSignature { subject: String, issuer: String },

    #[error("issuer key does not match issuer certificate {issuer}")]
    IssuerKeyMismatch { issuer: String },

    #[error("certificate {issuer} is not a CA and cannot issue {subject}")]
    NotCa { subject: String, issuer: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub version: u32,
    pub serial: String,
    pub subject: String,
    pub issuer: String,
    /// Base64 SPKI DER Ed25519 key.
    pub public_key: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub is_ca: bool,
    /// Base64 Ed25519 signature by the issuer over the to-be-signed fields.
    pub signature: String,
}

/// Fields covered by the issuer signature.
#[derive(Serialize)]
struct TbsCertificate<'a> {
    version: u32,
    serial: &'a str,
    subject: &'a str,
    issuer: &'a str,
    public_key: &'a str,
    not_before: &'a DateTime<Utc>,
    not_after: &'a DateTime<Utc>,
    is_ca: bool,
}

impl Certificate {
    /// Read a certificate from a JSON file.
    pub fn load(path: &Path) -> Result<Self, CertificateError> {
        let content = fs::read_to_string(path).map_err(|e| CertificateError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|e| CertificateError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn from_json(content: &str) -> Result<Self, CertificateError> {
        let cert: Self = serde_json::from_str(content)?;
        if cert.version != CERTIFICATE_VERSION {
            return Err(CertificateError::UnsupportedVersion(cert.version));
        }
        Ok(cert)
    }

    pub fn to_json_pretty(&self) -> Result<String, CertificateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// `sha256:<hex>` over the canonical form of the whole certificate.
    pub fn fingerprint(&self) -> Result<String, CertificateError> {
        Ok(sha256_prefixed(&jcs::to_vec(self)?))
    }

    pub fn public_key(&self) -> Result<VerifyingKey, CertificateError> {
        Ok(keys::decode_public_key(&self.public_key)?)
    }

    /// Key id of the certified public key.
    pub fn key_id(&self) -> Result<String, CertificateError> {
        Ok(keys::key_id(&self.public_key()?)?)
    }

    fn tbs_bytes(&self) -> Result<Vec<u8>, CertificateError> {
        Ok(jcs::to_vec(&TbsCertificate {
            version: self.version,
            serial: &self.serial,
            subject: &self.subject,
            issuer: &self.issuer,
            public_key: &self.public_key,
            not_before: &self.not_before,
            not_after: &self.not_after,
            is_ca: self.is_ca,
        })?)
    }

    /// Check that `issuer` is named by this certificate and signed it.
    ///
    /// Only CA certificates issue others; a certificate may always sign itself.
    pub fn verify_issued_by(&self, issuer: &Certificate) -> Result<(), CertificateError> {
        if self.issuer != issuer.subject {
            return Err(CertificateError::IssuerMismatch {
                subject: self.subject.clone(),
                expected: self.issuer.clone(),
                found: issuer.subject.clone(),
            });
        }
        if !issuer.is_ca && issuer != self {
            return Err(CertificateError::NotCa {
                subject: self.subject.clone(),
                issuer: issuer.subject.clone(),
            });
        }

        let key = issuer.public_key()?;
        let sig_bytes = BASE64
            .decode(&self.signature)
            .map_err(|e| CertificateError::SignatureEncoding(e.to_string()))?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| CertificateError::SignatureEncoding(e.to_string()))?;

        key.verify(&self.tbs_bytes()?, &signature)
            .map_err(|_| CertificateError::BadSignature {
                subject: self.subject.clone(),
                issuer: issuer.subject.clone(),
            })
    }

    /// Subject equals issuer and the certificate verifies under its own key.
    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer && self.verify_issued_by(self).is_ok()
    }

    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

/// Unsigned certificate contents; sign it to get a [`Certificate`].
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    subject: String,
    public_key: VerifyingKey,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    is_ca: bool,
}

impl CertificateRequest {
    /// Valid from now for one year, not a CA.
    pub fn new(subject: impl Into<String>, public_key: VerifyingKey) -> Self {
        let now = Utc::now()
            .duration_trunc(Duration::seconds(1))
            .unwrap_or_else(|_| Utc::now());
        Self {
            subject: subject.into(),
            public_key,
            not_before: now,
            not_after: now + Duration::days(365),
            is_ca: false,
        }
    }

    pub fn valid_for(mut self, validity: Duration) -> Self {
        self.not_after = self.not_before + validity;
        self
    }

    pub fn valid_between(mut self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    pub fn ca(mut self, is_ca: bool) -> Self {
        self.is_ca = is_ca;
        self
    }

    /// Self-sign with the subject's own key.
    pub fn self_sign(self, key: &SigningKey) -> Result<Certificate, CertificateError> {
        let issuer = self.subject.clone();
        self.sign(issuer, key)
    }

    /// Sign with an issuer certificate and its private key.
    pub fn sign_with(
        self,
        issuer: &Certificate,
        issuer_key: &SigningKey,
    ) -> Result<Certificate, CertificateError> {
        if !issuer.is_ca {
            return Err(CertificateError::NotCa {
                subject: self.subject,
                issuer: issuer.subject.clone(),
            });
        }
        if issuer.public_key()? != issuer_key.verifying_key() {
            return Err(CertificateError::IssuerKeyMismatch {
                issuer: issuer.subject.clone(),
            });
        }
        self.sign(issuer.subject.clone(), issuer_key)
    }

    fn sign(self, issuer: String, key: &SigningKey) -> Result<Certificate, CertificateError> {
        let mut serial = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut serial);

        let mut cert = Certificate {
            version: CERTIFICATE_VERSION,
            serial: hex::encode(serial),
            subject: self.subject,
            issuer,
            public_key: keys::encode_public_key(&self.public_key)?,
            not_before: self.not_before,
            not_after: self.not_after,
            is_ca: self.is_ca,
            signature: String::new(),
        };
        let signature = key.sign(&cert.tbs_bytes()?);
        cert.signature = BASE64.encode(signature.to_bytes());
        Ok(cert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::generate_signing_key;
    use tempfile::TempDir;

    fn root() -> (SigningKey, Certificate) {
        let key = generate_signing_key();
        let cert = CertificateRequest::new("root@example.org", key.verifying_key())
            .ca(true)
            .self_sign(&key)
            .unwrap();
        (key, cert)
    }

    #[test]
    fn test_self_signed_certificate() {
        let (key, cert) = root();
        assert!(cert.is_self_signed());
        assert!(cert.is_ca);
        assert_eq!(cert.public_key().unwrap(), key.verifying_key());
        assert!(cert.is_valid_at(Utc::now()));
        assert!(!cert.is_valid_at(Utc::now() + Duration::days(400)));
    }

    #[test]
    fn test_issued_certificate_chains_to_issuer() {
        let (root_key, root_cert) = root();
        let leaf_key = generate_signing_key();
        let leaf = CertificateRequest::new("dev@example.org", leaf_key.verifying_key())
            .sign_with(&root_cert, &root_key)
            .unwrap();

        assert_eq!(leaf.issuer, "root@example.org");
        assert!(!leaf.is_self_signed());
        leaf.verify_issued_by(&root_cert).unwrap();

        let (_, other_root) = root();
        // Same subject name, different key.
        assert!(matches!(
            leaf.verify_issued_by(&other_root),
            Err(CertificateError::BadSignature { .. })
        ));
    }

    #[test]
    fn test_issuer_key_must_match_issuer_cert() {
        let (_, root_cert) = root();
        let wrong = generate_signing_key();
        let leaf_key = generate_signing_key();
        let err = CertificateRequest::new("dev", leaf_key.verifying_key())
            .sign_with(&root_cert, &wrong)
            .unwrap_err();
        assert!(matches!(err, CertificateError::IssuerKeyMismatch { .. }));
    }

    #[test]
    fn test_only_ca_certificates_issue_others() {
        let dev_key = generate_signing_key();
        let dev = CertificateRequest::new("dev@example.org", dev_key.verifying_key())
            .self_sign(&dev_key)
            .unwrap();
        assert!(dev.is_self_signed());

        let mallory_key = generate_signing_key();
        let err = CertificateRequest::new("mallory@example.org", mallory_key.verifying_key())
            .sign_with(&dev, &dev_key)
            .unwrap_err();
        assert!(matches!(err, CertificateError::NotCa { .. }));

        // Hand-built certificate naming a non-CA issuer, correctly signed.
        let mut forged = CertificateRequest::new("mallory@example.org", mallory_key.verifying_key())
            .self_sign(&mallory_key)
            .unwrap();
        forged.issuer = dev.subject.clone();
        forged.signature = BASE64.encode(dev_key.sign(&forged.tbs_bytes().unwrap()).to_bytes());
        assert!(matches!(
            forged.verify_issued_by(&dev),
            Err(CertificateError::NotCa { .. })
        ));
    }

    #[test]
    fn test_tampered_field_breaks_signature_and_fingerprint() {
        let (_, cert) = root();
        let fingerprint = cert.fingerprint().unwrap();

        let mut tampered = cert.clone();
        tampered.not_after += Duration::days(3650);
        assert!(!tampered.is_self_signed());
        assert_ne!(tampered.fingerprint().unwrap(), fingerprint);
    }

    #[test]
    fn test_json_roundtrip_preserves_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let (_, cert) = root();
        let path = tmp.path().join("public_cert.json");
        fs::write(&path, cert.to_json_pretty().unwrap()).unwrap();

        let loaded = Certificate::load(&path).unwrap();
        assert_eq!(loaded, cert);
        assert_eq!(loaded.fingerprint().unwrap(), cert.fingerprint().unwrap());
        assert!(loaded.is_self_signed());
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let (_, mut cert) = root();
        cert.version = 7;
        let json = serde_json::to_string(&cert).unwrap();
        assert!(matches!(
            Certificate::from_json(&json),
            Err(CertificateError::UnsupportedVersion(7))
        ));
    }
}
