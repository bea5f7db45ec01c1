//! Package archives.
//!
//! An archive is a plain deterministic tar with a fixed entry order:
//!
//! | # | entry            | contents                                          |
//! |---|------------------|---------------------------------------------------|
//! | 1 | `metadata.json`  | JCS form of [`PackageMetadata`]                   |
//! | 2 | `data.tar.gz`    | deterministic tar.gz of the spec's files          |
//! | 3 | `checksums.json` | JCS form of [`Checksums`] over entries 1 and 2    |
//! | 4 | `signature.json` | optional [`SignatureBlock`](crate::sign::SignatureBlock) |
//!
//! The payload digest is SHA-256 over the JCS bytes of the checksums
//! document. It commits to the first two entries and never to the signature.

mod tar_write;

pub mod reader;
pub mod writer;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::{jcs, PayloadDigest};
use crate::spec::Version;
use crate::validate::ValidatedSpec;

pub use reader::{ArchiveError, ArchiveReader, FileEntry};
pub use writer::{Archive, ArchiveBuilder, StagedArchive};

/// File extension of built archives.
pub const ARCHIVE_EXTENSION: &str = "bale";

pub const FORMAT_VERSION: u32 = 1;

pub const METADATA_ENTRY: &str = "metadata.json";
pub const DATA_ENTRY: &str = "data.tar.gz";
pub const CHECKSUMS_ENTRY: &str = "checksums.json";
pub const SIGNATURE_ENTRY: &str = "signature.json";

/// Outer entries in the only order an archive may hold them.
pub(crate) const ENTRY_ORDER: [&str; 4] =
    [METADATA_ENTRY, DATA_ENTRY, CHECKSUMS_ENTRY, SIGNATURE_ENTRY];

/// `{name}-{version}.bale`
pub fn archive_file_name(name: &str, version: &Version) -> String {
    format!("{name}-{version}.{ARCHIVE_EXTENSION}")
}

/// Package metadata stored as the first archive entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub format_version: u32,
    pub name: String,
    pub version: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub licenses: Vec<String>,
    pub files: Vec<String>,
}

impl PackageMetadata {
    pub fn from_spec(validated: &ValidatedSpec) -> Self {
        let spec = validated.spec();
        Self {
            format_version: FORMAT_VERSION,
            name: spec.name.clone(),
            version: validated.version().to_string(),
            summary: spec.summary.clone(),
            description: spec.description.clone(),
            authors: spec.authors.clone(),
            homepage: spec.homepage.clone(),
            date: validated.date().map(|d| d.format("%Y-%m-%d").to_string()),
            licenses: spec.licenses.clone(),
            files: validated.files().to_vec(),
        }
    }
}

/// Digests of the payload entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    pub algorithm: String,
    /// Entry name to `sha256:<hex>`.
    pub files: BTreeMap<String, String>,
}

impl Checksums {
    pub fn new(metadata_digest: String, data_digest: String) -> Self {
        let mut files = BTreeMap::new();
        files.insert(METADATA_ENTRY.to_string(), metadata_digest);
        files.insert(DATA_ENTRY.to_string(), data_digest);
        Self {
            algorithm: "sha256".to_string(),
            files,
        }
    }

    pub fn canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        jcs::to_vec(self)
    }

    pub fn payload_digest(&self) -> serde_json::Result<PayloadDigest> {
        Ok(PayloadDigest::of(&self.canonical_bytes()?))
    }
}
