//! Archive verification.
//!
//! # Verification Steps
//!
//! 1. Open the archive and recompute the payload digest from entry bytes
//! 2. Reject unsigned archives when the policy demands signatures
//! 3. `verify_data`: stored checksums and signed digest match the payload
//! 4. Decode the embedded certificate chain
//! 5. `verify_signer`: leaf key verifies the signature over
//!    PAE(payload_type, digest); leaf valid at the reference time
//! 6. `verify_chain`: each link is signed by the next
//! 7. `verify_root`: chain top is self-signed or issued by a trusted cert
//! 8. `only_trusted`: the leaf is trusted directly or through the chain
//!
//! A well-formed archive that fails a check is reported as not verified.
//! Only structural problems (unreadable archive, malformed certificates,
//! missing signature under a signing policy) are errors.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::ArchiveReader;
use crate::cert::Certificate;
use crate::crypto::PayloadDigest;
use crate::error::VerificationError;
use crate::sign::{build_pae, SignatureBlock, PAYLOAD_TYPE, SIGNATURE_ALGORITHM};
use crate::trust::TrustStore;

/// Named set of verification switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityPolicy {
    pub name: &'static str,
    pub verify_data: bool,
    pub verify_signer: bool,
    pub verify_chain: bool,
    pub verify_root: bool,
    pub only_trusted: bool,
    pub only_signed: bool,
}

impl SecurityPolicy {
    /// Checks nothing.
    pub const NO: Self = Self {
        name: "no",
        verify_data: false,
        verify_signer: false,
        verify_chain: false,
        verify_root: false,
        only_trusted: false,
        only_signed: false,
    };

    /// Checks payload integrity only.
    pub const ALMOST_NO: Self = Self {
        name: "almost-no",
        verify_data: true,
        ..Self::NO
    };

    /// Integrity plus the leaf signature; any signer is accepted.
    pub const LOW: Self = Self {
        name: "low",
        verify_signer: true,
        ..Self::ALMOST_NO
    };

    /// Full chain to a trusted certificate; unsigned archives pass.
    pub const MEDIUM: Self = Self {
        name: "medium",
        verify_chain: true,
        verify_root: true,
        only_trusted: true,
        ..Self::LOW
    };

    /// Like medium, but unsigned archives are refused.
    pub const HIGH: Self = Self {
        name: "high",
        only_signed: true,
        ..Self::MEDIUM
    };

    pub const ALL: [Self; 5] = [Self::NO, Self::ALMOST_NO, Self::LOW, Self::MEDIUM, Self::HIGH];
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::HIGH
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown security policy {0:?} (expected one of: no, almost-no, low, medium, high)")]
pub struct UnknownPolicy(pub String);

impl FromStr for SecurityPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|p| p.name == wanted)
            .ok_or_else(|| UnknownPolicy(s.to_string()))
    }
}

/// Full verification outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub verified: bool,
    pub signed: bool,
    pub policy: String,
    /// Recomputed payload digest.
    pub digest: String,
    /// Leaf certificate subject, for signed archives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
    pub notes: Vec<String>,
    /// First failed check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl VerifyReport {
    fn fail(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(policy = %self.policy, %reason, "archive not verified");
        self.verified = false;
        self.failure = Some(reason);
        self
    }

    fn pass(mut self) -> Self {
        self.verified = true;
        self
    }
}

pub struct Verifier<'a> {
    store: &'a TrustStore,
    policy: SecurityPolicy,
    at: Option<DateTime<Utc>>,
}

impl<'a> Verifier<'a> {
    pub fn new(store: &'a TrustStore, policy: SecurityPolicy) -> Self {
        Self {
            store,
            policy,
            at: None,
        }
    }

    /// Check certificate validity at `at` instead of now.
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }

    /// Whether the archive at `path` satisfies the policy.
    pub fn verify(&self, path: &Path) -> Result<bool, VerificationError> {
        Ok(self.verify_report(path)?.verified)
    }

    pub fn verify_report(&self, path: &Path) -> Result<VerifyReport, VerificationError> {
        let unreadable = |reason: String| VerificationError::ArchiveUnreadable {
            path: path.to_path_buf(),
            reason,
        };
        let reader = ArchiveReader::open(path).map_err(|e| unreadable(e.to_string()))?;
        let digest = reader
            .payload_digest()
            .map_err(|e| unreadable(e.to_string()))?;

        let report = self.check(&reader, &digest)?;
        if report.verified {
            info!(
                path = %path.display(),
                policy = %self.policy,
                signed = report.signed,
                signer = report.signer.as_deref().unwrap_or("-"),
                "archive verified"
            );
        }
        Ok(report)
    }

    fn check(
        &self,
        reader: &ArchiveReader,
        digest: &PayloadDigest,
    ) -> Result<VerifyReport, VerificationError> {
        let policy = self.policy;
        let mut report = VerifyReport {
            verified: false,
            signed: reader.signature().is_some(),
            policy: policy.name.to_string(),
            digest: digest.to_string(),
            signer: None,
            notes: Vec::new(),
            failure: None,
        };

        let Some(block) = reader.signature() else {
            if policy.only_signed {
                return Err(VerificationError::SignatureMissing {
                    policy: policy.name.to_string(),
                });
            }
            if policy.verify_data && reader.checksums() != &reader.compute_checksums() {
                return Ok(report.fail("checksums do not match archive contents"));
            }
            report.notes.push("archive is unsigned".to_string());
            return Ok(report.pass());
        };

        if policy.verify_data {
            if reader.checksums() != &reader.compute_checksums() {
                return Ok(report.fail("checksums do not match archive contents"));
            }
            if PayloadDigest::parse(&block.digest).as_ref() != Some(digest) {
                return Ok(report.fail(format!(
                    "signed digest {} does not match payload digest {digest}",
                    block.digest
                )));
            }
        }

        let keys = decode_chain(block)?;
        let chain = &block.cert_chain;
        let leaf = &chain[0];
        report.signer = Some(leaf.subject.clone());

        if policy.verify_signer {
            if let Err(reason) = self.check_signer(block, leaf, &keys[0], digest) {
                return Ok(report.fail(reason));
            }
        }

        let at = self.reference_time();
        if policy.verify_chain {
            for link in chain.windows(2) {
                if let Err(e) = link[0].verify_issued_by(&link[1]) {
                    return Ok(report.fail(format!("broken certificate chain: {e}")));
                }
            }
            if let Some(expired) = chain.iter().skip(1).find(|c| !c.is_valid_at(at)) {
                return Ok(report.fail(format!(
                    "chain certificate {} is not valid at {at} (valid {} to {})",
                    expired.subject, expired.not_before, expired.not_after
                )));
            }
        }

        let top = &chain[chain.len() - 1];
        if policy.verify_root && !top.is_self_signed() {
            match self.store.find_issuer(top)? {
                None => {
                    return Ok(report.fail(format!(
                        "root certificate {} is not self-signed and its issuer {} is not trusted",
                        top.subject, top.issuer
                    )))
                }
                Some(issuer) if !issuer.is_valid_at(at) => {
                    return Ok(report.fail(format!(
                        "trusted issuer {} is not valid at {at} (valid {} to {})",
                        issuer.subject, issuer.not_before, issuer.not_after
                    )))
                }
                Some(_) => {}
            }
        }

        let trusted = self.store.is_trusted_via(leaf, chain)?;
        if !trusted {
            if policy.only_trusted {
                return Ok(report.fail(format!(
                    "signer {} does not chain to a trusted certificate",
                    leaf.subject
                )));
            }
            report.notes.push(format!(
                "signer {} is not in the trust store",
                leaf.subject
            ));
        }
        if top.is_self_signed() && !self.store.is_trusted(top)? {
            report
                .notes
                .push(format!("chain ends in untrusted self-signed certificate {}", top.subject));
        }

        debug!(policy = %policy, signer = %leaf.subject, trusted, "signature checks passed");
        Ok(report.pass())
    }

    fn reference_time(&self) -> DateTime<Utc> {
        self.at.unwrap_or_else(Utc::now)
    }

    fn check_signer(
        &self,
        block: &SignatureBlock,
        leaf: &Certificate,
        leaf_key: &VerifyingKey,
        digest: &PayloadDigest,
    ) -> Result<(), String> {
        if block.algorithm != SIGNATURE_ALGORITHM {
            return Err(format!("unsupported signature algorithm {:?}", block.algorithm));
        }
        if block.payload_type != PAYLOAD_TYPE {
            return Err(format!("unexpected payload type {:?}", block.payload_type));
        }

        let leaf_key_id = leaf.key_id().map_err(|e| e.to_string())?;
        if leaf_key_id != block.key_id {
            return Err(format!(
                "key id {} does not match leaf certificate key {leaf_key_id}",
                block.key_id
            ));
        }

        let sig_bytes = BASE64
            .decode(&block.signature)
            .map_err(|e| format!("signature is not valid base64: {e}"))?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| format!("signature has the wrong length: {e}"))?;
        leaf_key
            .verify(&build_pae(PAYLOAD_TYPE, digest.as_bytes()), &signature)
            .map_err(|_| "signature does not match payload digest".to_string())?;

        let at = self.reference_time();
        if !leaf.is_valid_at(at) {
            return Err(format!(
                "leaf certificate {} is not valid at {at} (valid {} to {})",
                leaf.subject, leaf.not_before, leaf.not_after
            ));
        }
        Ok(())
    }
}

/// Public keys of every chain member, leaf first.
fn decode_chain(block: &SignatureBlock) -> Result<Vec<VerifyingKey>, VerificationError> {
    if block.cert_chain.is_empty() {
        return Err(VerificationError::MalformedCertificate {
            reason: "signature carries an empty certificate chain".to_string(),
        });
    }
    block
        .cert_chain
        .iter()
        .map(|cert| {
            cert.public_key()
                .map_err(|e| VerificationError::MalformedCertificate {
                    reason: format!("{}: {e}", cert.subject),
                })
        })
        .collect()
}
