//! Package specification model.
//!
//! A [`Specification`] is what a `.balespec` file declares. It is consumed
//! read-only by the validator and the archive builder; nothing in the
//! pipeline mutates it.

pub mod loader;
pub mod version;

use std::path::{Path, PathBuf};

pub use loader::{load_spec, resolve_spec_path, SPEC_EXTENSION};
pub use version::Version;

/// Signing material declared by a spec.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Signing {
    /// Build an unsigned archive.
    #[default]
    Unsigned,
    /// Sign the archive with `key`, embedding `chain` (leaf first).
    Request(SigningRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    /// PKCS#8 PEM private key.
    pub key: PathBuf,
    /// Certificate files, leaf first.
    pub chain: Vec<PathBuf>,
}

/// Declared package metadata plus file manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specification {
    pub name: String,
    /// Raw version text; parsed by the validator.
    pub version: String,
    pub summary: String,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub homepage: Option<String>,
    /// Release date literal exactly as written in the source.
    pub date: Option<String>,
    pub licenses: Vec<String>,
    /// Relative paths, archived in this order.
    pub files: Vec<String>,
    pub signing: Signing,
    /// Directory that relative file, key and certificate paths resolve against.
    pub base_dir: PathBuf,
}

impl Specification {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            summary: String::new(),
            description: None,
            authors: Vec::new(),
            homepage: None,
            date: None,
            licenses: Vec::new(),
            files: Vec::new(),
            signing: Signing::Unsigned,
            base_dir: PathBuf::from("."),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.licenses.push(license.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn with_files<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_signing(mut self, key: impl Into<PathBuf>, chain: Vec<PathBuf>) -> Self {
        self.signing = Signing::Request(SigningRequest {
            key: key.into(),
            chain,
        });
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Resolve a spec-relative path against `base_dir`. Absolute paths pass
    /// through unchanged.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}
