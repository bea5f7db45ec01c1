//! SHA-256 helpers.
//!
//! Digests are rendered as `sha256:<lowercase-hex>` everywhere they are
//! stored or compared.

use std::fmt;
use std::io::{self, Write};

use sha2::{Digest, Sha256};

const PREFIX: &str = "sha256:";

/// `sha256:<hex>` of a byte slice.
pub fn sha256_prefixed(bytes: &[u8]) -> String {
    format!("{PREFIX}{}", hex::encode(Sha256::digest(bytes)))
}

/// Raw SHA-256 of a byte slice.
pub fn sha256_raw(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(bytes));
    out
}

/// Writer adapter that hashes everything passing through it.
///
/// Lets the archive builder know an entry's digest and length the moment the
/// entry is finished, without re-reading what it wrote.
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Consume the adapter, returning the inner writer and `sha256:<hex>`.
    pub fn finish(self) -> (W, String) {
        let digest = format!("{PREFIX}{}", hex::encode(self.hasher.finalize()));
        (self.inner, digest)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Digest over an archive payload; the exact bytes a signature covers.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadDigest([u8; 32]);

impl PayloadDigest {
    /// Digest of the given canonical bytes.
    pub fn of(canonical: &[u8]) -> Self {
        Self(sha256_raw(canonical))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a `sha256:<hex>` string.
    pub fn parse(s: &str) -> Option<Self> {
        let hex_part = s.strip_prefix(PREFIX)?;
        let decoded = hex::decode(hex_part).ok()?;
        let bytes: [u8; 32] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for PayloadDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PayloadDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadDigest({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_writer_matches_one_shot_digest() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();

        let (buf, digest) = writer.finish();
        assert_eq!(buf, b"hello world");
        assert_eq!(digest, sha256_prefixed(b"hello world"));
    }

    #[test]
    fn test_payload_digest_parse_display() {
        let digest = PayloadDigest::of(b"payload");
        let rendered = digest.to_string();
        assert!(rendered.starts_with("sha256:"));
        assert_eq!(PayloadDigest::parse(&rendered), Some(digest));
    }

    #[test]
    fn test_payload_digest_parse_rejects_garbage() {
        assert_eq!(PayloadDigest::parse("md5:abcd"), None);
        assert_eq!(PayloadDigest::parse("sha256:zz"), None);
        assert_eq!(PayloadDigest::parse("sha256:abcd"), None);
    }
}
