//! Archive reader.
//!
//! Loads the outer entries into memory and exposes them for inspection and
//! verification. Parsing is strict: entries must appear in the fixed order,
//! each at most once, and nothing else may be present. Digests are always
//! recomputed from the entry bytes; stored values are only ever compared.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;

use super::{
    Checksums, PackageMetadata, CHECKSUMS_ENTRY, DATA_ENTRY, ENTRY_ORDER, METADATA_ENTRY,
    SIGNATURE_ENTRY,
};
use crate::crypto::{sha256_prefixed, PayloadDigest};
use crate::sign::SignatureBlock;

/// Largest outer entry accepted.
pub const MAX_ENTRY_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to read archive: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt archive: {0}")]
    Corrupt(String),

    #[error("archive has no {0} entry")]
    MissingEntry(&'static str),
}

/// A file stored in `data.tar.gz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub mode: u32,
    pub contents: Vec<u8>,
}

pub struct ArchiveReader {
    metadata: PackageMetadata,
    metadata_bytes: Vec<u8>,
    data_bytes: Vec<u8>,
    checksums: Checksums,
    signature: Option<SignatureBlock>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ArchiveError> {
        let mut archive = tar::Archive::new(reader);
        let mut found: Vec<Vec<u8>> = Vec::with_capacity(ENTRY_ORDER.len());

        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();

            let Some(expected) = ENTRY_ORDER.get(found.len()) else {
                return Err(ArchiveError::Corrupt(format!(
                    "unexpected entry {name:?} after {SIGNATURE_ENTRY}"
                )));
            };
            if name != *expected {
                return Err(ArchiveError::Corrupt(
                    if ENTRY_ORDER.contains(&name.as_str()) {
                        format!("entry {name:?} is duplicated or out of order")
                    } else {
                        format!("unexpected entry {name:?}")
                    },
                ));
            }
            if entry.header().size()? > MAX_ENTRY_BYTES {
                return Err(ArchiveError::Corrupt(format!("entry {name:?} is too large")));
            }

            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            found.push(bytes);
        }

        let mut entries = found.into_iter();
        let metadata_bytes = entries
            .next()
            .ok_or(ArchiveError::MissingEntry(METADATA_ENTRY))?;
        let data_bytes = entries
            .next()
            .ok_or(ArchiveError::MissingEntry(DATA_ENTRY))?;
        let checksums_bytes = entries
            .next()
            .ok_or(ArchiveError::MissingEntry(CHECKSUMS_ENTRY))?;
        let signature_bytes = entries.next();

        let metadata = parse_json(METADATA_ENTRY, &metadata_bytes)?;
        let checksums = parse_json(CHECKSUMS_ENTRY, &checksums_bytes)?;
        let signature = signature_bytes
            .map(|bytes| parse_json(SIGNATURE_ENTRY, &bytes))
            .transpose()?;

        Ok(Self {
            metadata,
            metadata_bytes,
            data_bytes,
            checksums,
            signature,
        })
    }

    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    /// Checksums as stored in the archive.
    pub fn checksums(&self) -> &Checksums {
        &self.checksums
    }

    pub fn signature(&self) -> Option<&SignatureBlock> {
        self.signature.as_ref()
    }

    pub fn metadata_bytes(&self) -> &[u8] {
        &self.metadata_bytes
    }

    pub fn data_bytes(&self) -> &[u8] {
        &self.data_bytes
    }

    /// Checksums recomputed from the entry bytes.
    pub fn compute_checksums(&self) -> Checksums {
        Checksums::new(
            sha256_prefixed(&self.metadata_bytes),
            sha256_prefixed(&self.data_bytes),
        )
    }

    /// Payload digest recomputed from the entry bytes.
    pub fn payload_digest(&self) -> Result<PayloadDigest, ArchiveError> {
        self.compute_checksums()
            .payload_digest()
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))
    }

    /// Every file in `data.tar.gz`, in archive order.
    pub fn files(&self) -> Result<Vec<FileEntry>, ArchiveError> {
        let mut data = tar::Archive::new(GzDecoder::new(Cursor::new(&self.data_bytes)));
        let mut files = Vec::new();
        for entry in data.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            let mode = entry.header().mode()?;
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            files.push(FileEntry {
                path,
                mode,
                contents,
            });
        }
        Ok(files)
    }

    pub fn file_names(&self) -> Result<Vec<String>, ArchiveError> {
        Ok(self.files()?.into_iter().map(|f| f.path).collect())
    }

    /// Contents of one packaged file, if present.
    pub fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        Ok(self
            .files()?
            .into_iter()
            .find(|f| f.path == path)
            .map(|f| f.contents))
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(
    entry: &str,
    bytes: &[u8],
) -> Result<T, ArchiveError> {
    serde_json::from_slice(bytes).map_err(|e| ArchiveError::Corrupt(format!("{entry}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tar_write::{append_entry, deterministic_tar};
    use crate::archive::ArchiveBuilder;
    use crate::spec::Specification;
    use crate::validate::validate;
    use std::fs;
    use tempfile::TempDir;

    fn outer(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut tar = deterministic_tar(Vec::new());
        for (name, data) in entries {
            append_entry(&mut tar, name, 0o644, data).unwrap();
        }
        tar.into_inner().unwrap()
    }

    fn built_archive(tmp: &TempDir) -> std::path::PathBuf {
        fs::write(tmp.path().join("a.txt"), "alpha\n").unwrap();
        fs::write(tmp.path().join("b.txt"), "beta\n").unwrap();
        let spec = Specification::new("pkg", "0.1.0")
            .with_summary("s")
            .with_license("MIT")
            .with_files(["a.txt", "b.txt"])
            .with_base_dir(tmp.path());
        ArchiveBuilder::new(tmp.path().join("out"))
            .build(&validate(&spec).unwrap())
            .unwrap()
            .path
    }

    #[test]
    fn test_reads_built_archive() {
        let tmp = TempDir::new().unwrap();
        let reader = ArchiveReader::open(&built_archive(&tmp)).unwrap();

        assert_eq!(reader.metadata().name, "pkg");
        assert_eq!(reader.metadata().version, "0.1.0");
        assert_eq!(reader.metadata().files, vec!["a.txt", "b.txt"]);
        assert!(reader.signature().is_none());
        assert_eq!(reader.checksums(), &reader.compute_checksums());
        assert_eq!(reader.file_names().unwrap(), vec!["a.txt", "b.txt"]);
        assert_eq!(
            reader.read_file("b.txt").unwrap().as_deref(),
            Some(&b"beta\n"[..])
        );
        assert_eq!(reader.read_file("c.txt").unwrap(), None);
    }

    #[test]
    fn test_unknown_entry_is_corrupt() {
        let bytes = outer(&[(METADATA_ENTRY, &b"{}"[..]), ("evil.sh", &b"rm -rf /"[..])]);
        let err = ArchiveReader::from_reader(Cursor::new(bytes)).err().unwrap();
        assert!(matches!(err, ArchiveError::Corrupt(ref m) if m.contains("evil.sh")));
    }

    #[test]
    fn test_duplicate_entry_is_corrupt() {
        let bytes = outer(&[(METADATA_ENTRY, &b"{}"[..]), (METADATA_ENTRY, &b"{}"[..])]);
        let err = ArchiveReader::from_reader(Cursor::new(bytes)).err().unwrap();
        assert!(matches!(err, ArchiveError::Corrupt(ref m) if m.contains("duplicated")));
    }

    #[test]
    fn test_missing_checksums_reported() {
        let bytes = outer(&[(METADATA_ENTRY, &b"{}"[..]), (DATA_ENTRY, &b""[..])]);
        let err = ArchiveReader::from_reader(Cursor::new(bytes)).err().unwrap();
        assert!(matches!(err, ArchiveError::MissingEntry(CHECKSUMS_ENTRY)));
    }

    #[test]
    fn test_not_a_tar_is_an_error() {
        assert!(ArchiveReader::from_reader(Cursor::new(b"garbage".to_vec())).is_err());
    }
}
