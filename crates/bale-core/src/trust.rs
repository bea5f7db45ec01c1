//! Trusted certificate store.
//!
//! A directory holding one `<fingerprint-hex>.json` per trusted certificate
//! plus a `.lock` file. Readers hold a shared lock on `.lock` and writers an
//! exclusive one, so concurrent processes always see whole entries. New
//! entries are written to a temporary file and renamed into place.
//!
//! The store is an explicit value: open it once and pass it by reference to
//! whatever needs it.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info, warn};

use crate::cert::Certificate;
use crate::error::TrustError;

const LOCK_FILE: &str = ".lock";
const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct TrustStore {
    dir: PathBuf,
}

/// Held advisory lock on `<dir>/.lock`; released on drop.
struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl TrustStore {
    /// Open the store at `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, TrustError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| TrustError::Io {
            path: dir.clone(),
            source,
        })?;
        let store = Self { dir };
        // Materialize the lock file up front.
        drop(store.lock(false)?);
        debug!(dir = %store.dir.display(), "opened trust store");
        Ok(store)
    }

    /// Open the store at [`TrustStore::default_dir`].
    pub fn open_default() -> Result<Self, TrustError> {
        Self::open(Self::default_dir()?)
    }

    /// `~/.bale/trust`
    pub fn default_dir() -> Result<PathBuf, TrustError> {
        dirs::home_dir()
            .map(|home| home.join(".bale").join("trust"))
            .ok_or(TrustError::NoDefaultDir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Add a certificate. Returns `false` if it was already trusted.
    pub fn trust(&self, cert: &Certificate) -> Result<bool, TrustError> {
        let fingerprint = self.fingerprint_of(cert)?;
        let path = self.entry_path(&fingerprint);

        let _lock = self.lock(true)?;
        if path.exists() {
            debug!(%fingerprint, "certificate already trusted");
            return Ok(false);
        }

        let json = cert.to_json_pretty().map_err(|e| TrustError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        self.write_atomic(&path, json.as_bytes())?;

        info!(%fingerprint, subject = %cert.subject, "trusted certificate");
        Ok(true)
    }

    /// Remove a certificate by fingerprint (`sha256:<hex>` or bare hex).
    /// Returns `false` if it was not present.
    pub fn remove(&self, fingerprint: &str) -> Result<bool, TrustError> {
        if !is_fingerprint(fingerprint) {
            return Ok(false);
        }
        let path = self.entry_path(fingerprint);
        let _lock = self.lock(true)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(%fingerprint, "removed trusted certificate");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(TrustError::Io { path, source }),
        }
    }

    /// Trusted certificate with this fingerprint, if any.
    pub fn get(&self, fingerprint: &str) -> Result<Option<Certificate>, TrustError> {
        if !is_fingerprint(fingerprint) {
            return Ok(None);
        }
        let _lock = self.lock(false)?;
        self.read_entry(&self.entry_path(fingerprint))
    }

    /// All trusted certificates, ordered by subject then fingerprint.
    pub fn list(&self) -> Result<Vec<Certificate>, TrustError> {
        let _lock = self.lock(false)?;
        let mut entries = self.read_all()?;
        entries.sort_by(|a, b| a.1.subject.cmp(&b.1.subject).then(a.0.cmp(&b.0)));
        Ok(entries.into_iter().map(|(_, cert)| cert).collect())
    }

    /// Whether this exact certificate is in the store.
    pub fn is_trusted(&self, cert: &Certificate) -> Result<bool, TrustError> {
        let fingerprint = self.fingerprint_of(cert)?;
        Ok(self.get(&fingerprint)?.as_ref() == Some(cert))
    }

    /// Trusted certificate that issued `cert` (subject match and a verifying
    /// signature).
    pub fn find_issuer(&self, cert: &Certificate) -> Result<Option<Certificate>, TrustError> {
        let _lock = self.lock(false)?;
        Ok(self
            .read_all()?
            .into_iter()
            .map(|(_, candidate)| candidate)
            .find(|candidate| cert.verify_issued_by(candidate).is_ok()))
    }

    /// Whether `cert` is trusted directly or through `chain`.
    ///
    /// Walks upward from `cert`: each step moves to the chain member that
    /// issued the current certificate. The walk succeeds when it reaches a
    /// trusted certificate, or a certificate whose issuer is trusted.
    pub fn is_trusted_via(
        &self,
        cert: &Certificate,
        chain: &[Certificate],
    ) -> Result<bool, TrustError> {
        let trusted = {
            let _lock = self.lock(false)?;
            self.read_all()?
        };
        let trusted_fingerprints: HashSet<&str> =
            trusted.iter().map(|(fp, _)| fp.as_str()).collect();
        let is_anchor = |c: &Certificate| -> Result<bool, TrustError> {
            let fingerprint = self.fingerprint_of(c)?;
            Ok(trusted_fingerprints.contains(strip_prefix(&fingerprint))
                || trusted.iter().any(|(_, t)| c.verify_issued_by(t).is_ok()))
        };

        let mut current = cert;
        // Each step consumes one chain member, so the walk is bounded.
        for _ in 0..=chain.len() {
            if is_anchor(current)? {
                return Ok(true);
            }
            if current.is_self_signed() {
                return Ok(false);
            }
            match chain
                .iter()
                .find(|next| *next != current && current.verify_issued_by(next).is_ok())
            {
                Some(next) => current = next,
                None => return Ok(false),
            }
        }
        Ok(false)
    }

    fn fingerprint_of(&self, cert: &Certificate) -> Result<String, TrustError> {
        cert.fingerprint().map_err(|e| TrustError::Corrupt {
            path: self.dir.clone(),
            reason: format!("cannot fingerprint certificate {}: {e}", cert.subject),
        })
    }

    fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{ENTRY_EXTENSION}", strip_prefix(fingerprint)))
    }

    fn lock(&self, exclusive: bool) -> Result<StoreLock, TrustError> {
        let path = self.dir.join(LOCK_FILE);
        let io_err = |source| TrustError::Io {
            path: path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(io_err)?;
        if exclusive {
            FileExt::lock_exclusive(&file).map_err(io_err)?;
        } else {
            FileExt::lock_shared(&file).map_err(io_err)?;
        }
        Ok(StoreLock { file })
    }

    fn read_entry(&self, path: &Path) -> Result<Option<Certificate>, TrustError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(TrustError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Certificate::from_json(&content)
            .map(Some)
            .map_err(|e| TrustError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// `(fingerprint hex, certificate)` for every entry. Caller holds the lock.
    fn read_all(&self) -> Result<Vec<(String, Certificate)>, TrustError> {
        let io_err = |source| TrustError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned)
            else {
                continue;
            };
            match self.read_entry(&path)? {
                Some(cert) => out.push((stem, cert)),
                None => warn!(path = %path.display(), "trust store entry vanished while listing"),
            }
        }
        Ok(out)
    }

    fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<(), TrustError> {
        let io_err = |source| TrustError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        temp.write_all(content).map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

fn strip_prefix(fingerprint: &str) -> &str {
    fingerprint.strip_prefix("sha256:").unwrap_or(fingerprint)
}

/// Only hex digests name store entries.
fn is_fingerprint(fingerprint: &str) -> bool {
    let hex = strip_prefix(fingerprint);
    !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit())
}
