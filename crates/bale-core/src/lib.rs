//! Package build, signing and verification.
//!
//! This crate turns a declarative package specification into a
//! deterministic, optionally signed archive, and verifies such archives
//! against a local trust store:
//!
//! - Spec loading (`.balespec` YAML) and strict validation
//! - Deterministic archive writing with atomic, no-clobber sealing
//! - Ed25519 signatures over the payload digest with an embedded
//!   certificate chain
//! - A file-locked trust store of signer certificates
//! - Verification under named security policies
//!
//! # Quick Start
//!
//! ```no_run
//! use bale_core::{BuildOptions, Orchestrator, SecurityPolicy, TrustStore, Verifier};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut orchestrator = Orchestrator::new(BuildOptions::new("pkg"));
//! let report = orchestrator.build_file(Path::new("some_gem.balespec"))?;
//! print!("{report}");
//!
//! let store = TrustStore::open_default()?;
//! let ok = Verifier::new(&store, SecurityPolicy::HIGH).verify(&report.output_path)?;
//! println!("verified: {ok}");
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `BALE_TRUST_DIR` | Trust store directory (default: `~/.bale/trust`) |
//! | `BALE_SECURITY_POLICY` | Verification policy (default: `high`) |
//! | `BALE_OUTPUT_DIR` | Archive output directory (default: current directory) |

pub mod archive;
pub mod build;
pub mod cert;
pub mod config;
pub mod crypto;
pub mod error;
pub mod sign;
pub mod spec;
pub mod trust;
pub mod validate;
pub mod verify;

// Re-export main types
pub use archive::{
    archive_file_name, Archive, ArchiveBuilder, ArchiveError, ArchiveReader, Checksums,
    PackageMetadata, StagedArchive, ARCHIVE_EXTENSION,
};
pub use build::{BuildOptions, BuildReport, BuildState, Orchestrator};
pub use cert::{Certificate, CertificateError, CertificateRequest};
pub use config::BaleConfig;
pub use crypto::PayloadDigest;
pub use error::{
    BaleError, BaleResult, BuildError, SigningError, SpecLoadError, TrustError,
    ValidationError, VerificationError,
};
pub use sign::{SignatureBlock, Signer};
pub use spec::{load_spec, resolve_spec_path, Signing, SigningRequest, Specification, Version};
pub use trust::TrustStore;
pub use validate::{validate, ValidatedSpec, Warning};
pub use verify::{SecurityPolicy, Verifier, VerifyReport};
