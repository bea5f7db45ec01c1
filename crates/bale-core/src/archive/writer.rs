//! Archive writer.
//!
//! Building is two-phase so a signature can be computed over the payload
//! before the archive becomes visible:
//!
//! 1. [`ArchiveBuilder::stage`] writes metadata, data and checksums into a
//!    temporary file next to the final path and exposes the payload digest.
//! 2. [`StagedArchive::seal`] appends the optional signature entry, syncs,
//!    and renames the temporary file onto `{name}-{version}.bale`.
//!
//! Dropping a [`StagedArchive`] (or any error before the rename) deletes the
//! temporary file. The final name only ever refers to a sealed archive.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tar::Builder;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::tar_write::{append_entry, deterministic_tar, deterministic_tar_gz};
use super::{
    Checksums, PackageMetadata, CHECKSUMS_ENTRY, DATA_ENTRY, METADATA_ENTRY, SIGNATURE_ENTRY,
};
use crate::crypto::{jcs, sha256_prefixed, HashingWriter, PayloadDigest};
use crate::error::{BaleError, BuildError};
use crate::sign::{SignatureBlock, Signer};
use crate::spec::Signing;
use crate::validate::ValidatedSpec;

const ENTRY_MODE: u32 = 0o644;
const EXECUTABLE_MODE: u32 = 0o755;

/// A sealed archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub path: PathBuf,
    pub digest: PayloadDigest,
    pub signed: bool,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    output_dir: PathBuf,
    force: bool,
}

impl ArchiveBuilder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            force: false,
        }
    }

    /// Overwrite an existing archive instead of failing with `AlreadyExists`.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn output_path(&self, spec: &ValidatedSpec) -> PathBuf {
        self.output_dir.join(spec.file_name())
    }

    /// Stage, sign when the spec asks for it, and seal.
    pub fn build(&self, spec: &ValidatedSpec) -> Result<Archive, BaleError> {
        self.build_with(spec, || {})
    }

    /// [`ArchiveBuilder::build`], calling `on_signing` right before the
    /// signer loads its key. Not called for unsigned specs.
    pub fn build_with(
        &self,
        spec: &ValidatedSpec,
        on_signing: impl FnOnce(),
    ) -> Result<Archive, BaleError> {
        let staged = self.stage(spec)?;
        let block = match &spec.spec().signing {
            Signing::Unsigned => None,
            Signing::Request(request) => {
                on_signing();
                Some(Signer::load(request, spec.spec())?.sign(staged.digest())?)
            }
        };
        Ok(staged.seal(block.as_ref())?)
    }

    /// Write the payload entries into a temporary file.
    pub fn stage(&self, spec: &ValidatedSpec) -> Result<StagedArchive, BuildError> {
        let final_path = self.output_path(spec);
        if !self.force && final_path.exists() {
            return Err(BuildError::AlreadyExists { path: final_path });
        }

        fs::create_dir_all(&self.output_dir).map_err(|e| {
            BuildError::io(
                format!("creating output directory {}", self.output_dir.display()),
                e,
            )
        })?;

        let metadata = jcs::to_vec(&PackageMetadata::from_spec(spec))
            .map_err(|e| BuildError::io("encoding metadata", e.into()))?;
        let (data, data_digest) = write_data(spec)?;
        let checksums = Checksums::new(sha256_prefixed(&metadata), data_digest);
        let checksums_bytes = checksums
            .canonical_bytes()
            .map_err(|e| BuildError::io("encoding checksums", e.into()))?;
        let digest = PayloadDigest::of(&checksums_bytes);

        let temp = tempfile::Builder::new()
            .prefix(".bale-")
            .suffix(".partial")
            .tempfile_in(&self.output_dir)
            .map_err(|e| {
                BuildError::io(
                    format!("creating temporary file in {}", self.output_dir.display()),
                    e,
                )
            })?;

        let mut tar = deterministic_tar(temp);
        for (name, bytes) in [
            (METADATA_ENTRY, &metadata),
            (DATA_ENTRY, &data),
            (CHECKSUMS_ENTRY, &checksums_bytes),
        ] {
            append_entry(&mut tar, name, ENTRY_MODE, bytes)
                .map_err(|e| BuildError::io(format!("writing {name}"), e))?;
        }

        debug!(
            path = %final_path.display(),
            %digest,
            files = spec.files().len(),
            data_bytes = data.len(),
            "staged archive"
        );

        Ok(StagedArchive {
            tar,
            final_path,
            force: self.force,
            digest,
            checksums,
        })
    }
}

/// Payload written to a temporary file, waiting for an optional signature.
pub struct StagedArchive {
    tar: Builder<NamedTempFile>,
    final_path: PathBuf,
    force: bool,
    digest: PayloadDigest,
    checksums: Checksums,
}

impl StagedArchive {
    /// Digest a signature must cover.
    pub fn digest(&self) -> &PayloadDigest {
        &self.digest
    }

    pub fn checksums(&self) -> &Checksums {
        &self.checksums
    }

    /// Path the archive will have once sealed.
    pub fn path(&self) -> &Path {
        &self.final_path
    }

    /// Append the signature (if any) and move the archive into place.
    pub fn seal(self, signature: Option<&SignatureBlock>) -> Result<Archive, BuildError> {
        let Self {
            mut tar,
            final_path,
            force,
            digest,
            ..
        } = self;

        if let Some(block) = signature {
            let bytes = jcs::to_vec(block)
                .map_err(|e| BuildError::io("encoding signature", e.into()))?;
            append_entry(&mut tar, SIGNATURE_ENTRY, ENTRY_MODE, &bytes)
                .map_err(|e| BuildError::io(format!("writing {SIGNATURE_ENTRY}"), e))?;
        }

        let temp = tar
            .into_inner()
            .map_err(|e| BuildError::io("finishing archive", e))?;
        let size = finalize_file(temp.as_file())?;

        let persisted = if force {
            temp.persist(&final_path)
        } else {
            temp.persist_noclobber(&final_path)
        };
        persisted.map_err(|e| {
            // The rejected temp file is dropped (and removed) with `e`.
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                BuildError::AlreadyExists {
                    path: final_path.clone(),
                }
            } else {
                BuildError::io(format!("moving archive to {}", final_path.display()), e.error)
            }
        })?;

        info!(
            path = %final_path.display(),
            %digest,
            signed = signature.is_some(),
            size,
            "sealed archive"
        );

        Ok(Archive {
            path: final_path,
            digest,
            signed: signature.is_some(),
            size,
        })
    }
}

/// Set archive permissions and flush to disk; returns the final size.
fn finalize_file(file: &File) -> Result<u64, BuildError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(ENTRY_MODE))
            .map_err(|e| BuildError::io("setting archive permissions", e))?;
    }
    file.sync_all()
        .map_err(|e| BuildError::io("syncing archive", e))?;
    file.metadata()
        .map(|m| m.len())
        .map_err(|e| BuildError::io("reading archive size", e))
}

/// Build `data.tar.gz`, hashing the compressed stream as it is written.
fn write_data(spec: &ValidatedSpec) -> Result<(Vec<u8>, String), BuildError> {
    let mut tar = deterministic_tar_gz(HashingWriter::new(Vec::new()));

    for name in spec.files() {
        let source = spec.spec().resolve(name);
        let contents = fs::read(&source).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BuildError::FileNotFound {
                path: source.clone(),
            },
            _ => BuildError::io(format!("reading {}", source.display()), e),
        })?;
        let mode = source_mode(&source)?;
        append_entry(&mut tar, name, mode, &contents)
            .map_err(|e| BuildError::io(format!("archiving {name}"), e))?;
    }

    let encoder = tar
        .into_inner()
        .map_err(|e| BuildError::io("finishing data archive", e))?;
    let hashing = encoder
        .finish()
        .map_err(|e| BuildError::io("compressing data archive", e))?;
    Ok(hashing.finish())
}

#[cfg(unix)]
fn source_mode(path: &Path) -> Result<u32, BuildError> {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(path)
        .map_err(|e| BuildError::io(format!("reading metadata of {}", path.display()), e))?
        .permissions()
        .mode();
    Ok(if mode & 0o111 != 0 {
        EXECUTABLE_MODE
    } else {
        ENTRY_MODE
    })
}

#[cfg(not(unix))]
fn source_mode(_path: &Path) -> Result<u32, BuildError> {
    Ok(ENTRY_MODE)
}
