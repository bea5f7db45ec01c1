//! Error types for the build, signing and verification pipeline.
//!
//! Each stage owns its error enum so callers can tell a rejected spec apart
//! from a failed write or an unreadable archive. [`BaleError`] wraps all of
//! them for callers that drive the whole pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Spec validation errors. The first failing check wins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Date literal does not match the fixed-width `YYYY-MM-DD` grammar.
    #[error("invalid date format in specification: {literal:?}")]
    InvalidDateFormat { literal: String },

    /// Required attribute absent or blank.
    #[error("missing value for attribute {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for attribute name: {name:?} {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Malformed version number string {version}")]
    InvalidVersion { version: String },

    #[error("each license must be 64 characters or less: {license:?}")]
    LicenseTooLong { license: String },

    /// Absolute path or a path escaping the package root via `..`.
    #[error("file path {path:?} must be relative and stay inside the package root")]
    UnsafePath { path: String },

    #[error("duplicate file {path:?} in file list")]
    DuplicateFile { path: String },
}

/// Archive build errors.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Output archive exists and `force` was not set.
    #[error("archive already exists: {} (use --force to overwrite)", path.display())]
    AlreadyExists { path: PathBuf },

    /// A spec source or a file listed by the spec is missing.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("{context}: {source}")]
    IoFailure {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The orchestrator already reached a terminal state.
    #[error("build pipeline already finished; use a fresh orchestrator per build")]
    PipelineFinished,
}

impl BuildError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::IoFailure {
            context: context.into(),
            source,
        }
    }
}

/// Signing errors.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("signing key unreadable: {}: {reason}", path.display())]
    KeyUnreadable { path: PathBuf, reason: String },

    /// A key was supplied without any certificate.
    #[error("signing requires at least one certificate in the chain")]
    ChainEmpty,

    #[error("certificate unreadable: {}: {reason}", path.display())]
    CertificateUnreadable { path: PathBuf, reason: String },

    #[error("signing key {key_id} does not match leaf certificate {subject}")]
    KeyMismatch { key_id: String, subject: String },

    #[error("certificate {subject} is not valid at {at} (valid {not_before} to {not_after})")]
    CertificateExpired {
        subject: String,
        at: DateTime<Utc>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    },
}

/// Structural verification errors.
///
/// An untrusted or tampered archive is not an error: the verifier reports it
/// as "not verified".
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("archive unreadable: {}: {reason}", path.display())]
    ArchiveUnreadable { path: PathBuf, reason: String },

    #[error("unsigned archives are not allowed by the {policy} policy")]
    SignatureMissing { policy: String },

    #[error("malformed certificate: {reason}")]
    MalformedCertificate { reason: String },

    /// The trust store could not be consulted.
    #[error(transparent)]
    TrustStore(#[from] TrustError),
}

/// Trust store persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("trust store I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("trust store entry {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("could not determine trust store directory")]
    NoDefaultDir,
}

/// Spec source could not be parsed into a specification.
#[derive(Debug, thiserror::Error)]
#[error("error loading spec {}: {reason}", path.display())]
pub struct SpecLoadError {
    pub path: PathBuf,
    pub reason: String,
}

/// Any pipeline failure.
#[derive(Debug, thiserror::Error)]
pub enum BaleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    Load(#[from] SpecLoadError),
}

impl BaleError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Spec problems
            Self::Validation(_) | Self::Load(_) => 1,
            Self::Build(BuildError::FileNotFound { .. }) => 1,

            // Output problems
            Self::Build(_) => 2,

            // Key and certificate problems
            Self::Signing(_) => 3,

            // Archive / trust problems
            Self::Verification(VerificationError::TrustStore(_)) | Self::Trust(_) => 5,
            Self::Verification(_) => 4,
        }
    }

    /// Whether the spec itself was rejected (as opposed to an I/O fault).
    pub fn is_spec_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Load(_))
    }
}

/// Result alias for whole-pipeline operations.
pub type BaleResult<T> = Result<T, BaleError>;
