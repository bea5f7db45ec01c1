//! `.balespec` loader.
//!
//! Turns YAML source text into a [`Specification`]. The loader only maps
//! fields; it never judges them. Literal values (notably the release date)
//! are kept exactly as written so the validator sees what the author wrote.
//!
//! ```yaml
//! name: some_gem
//! version: 2
//! summary: this is a summary
//! date: "2010-11-08"
//! licenses: [MIT]
//! files:
//!   - lib/some_gem.rb
//! signing_key: certs/private_key.pem
//! cert_chain:
//!   - certs/public_cert.json
//! ```

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, warn};

use super::{Signing, SigningRequest, Specification};
use crate::error::{BuildError, SpecLoadError};

/// File extension of spec sources.
pub const SPEC_EXTENSION: &str = "balespec";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpecSource {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    date: Option<Value>,
    #[serde(default)]
    licenses: Vec<String>,
    /// Single-license shorthand, merged in front of `licenses`.
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    signing_key: Option<PathBuf>,
    #[serde(default)]
    cert_chain: Vec<PathBuf>,
}

/// Find the spec source for a command-line argument.
///
/// `path` is used as-is when it exists; otherwise `path.balespec` is tried.
/// Fails with [`BuildError::FileNotFound`] naming the original argument.
pub fn resolve_spec_path(path: &Path) -> Result<PathBuf, BuildError> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let mut with_ext = OsString::from(path.as_os_str());
    with_ext.push(".");
    with_ext.push(SPEC_EXTENSION);
    let with_ext = PathBuf::from(with_ext);
    if with_ext.is_file() {
        debug!(path = %with_ext.display(), "resolved spec path by extension");
        return Ok(with_ext);
    }

    Err(BuildError::FileNotFound {
        path: path.to_path_buf(),
    })
}

/// Read and parse a spec file. Relative paths inside the spec resolve against
/// the file's directory.
pub fn load_spec(path: &Path) -> Result<Specification, SpecLoadError> {
    let content = fs::read_to_string(path).map_err(|e| SpecLoadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    parse_spec(&content, base_dir).map_err(|reason| SpecLoadError {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parse spec source text.
pub fn parse_spec(content: &str, base_dir: impl Into<PathBuf>) -> Result<Specification, String> {
    let source: SpecSource =
        serde_yaml::from_str(content).map_err(|e| format!("invalid spec YAML: {e}"))?;

    let version = match source.version {
        Some(value) => literal("version", value, false)?.unwrap_or_default(),
        None => String::new(),
    };
    let date = match source.date {
        Some(value) => literal("date", value, true)?,
        None => None,
    };

    let mut licenses = Vec::with_capacity(source.licenses.len() + 1);
    licenses.extend(source.license);
    licenses.extend(source.licenses);

    let signing = match source.signing_key {
        Some(key) => Signing::Request(SigningRequest {
            key,
            chain: source.cert_chain,
        }),
        None => {
            if !source.cert_chain.is_empty() {
                warn!("cert_chain declared without signing_key; archive will be unsigned");
            }
            Signing::Unsigned
        }
    };

    Ok(Specification {
        name: source.name.unwrap_or_default(),
        version,
        summary: source.summary.unwrap_or_default(),
        description: source.description,
        authors: source.authors,
        homepage: source.homepage,
        date,
        licenses,
        files: source.files,
        signing,
        base_dir: base_dir.into(),
    })
}

/// Render a scalar YAML value as the literal text the author wrote.
///
/// Fractional numbers are refused for `version`: YAML would read `1.10` as
/// the float `1.1`.
fn literal(field: &str, value: Value, allow_float: bool) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) if n.is_i64() || n.is_u64() || allow_float => Ok(Some(n.to_string())),
        Value::Number(n) => Err(format!(
            "{field} {n} is a fractional number; quote it so it is kept as written"
        )),
        other => Err(format!("{field} must be a scalar, got {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_spec() {
        let spec = parse_spec(
            "name: some_gem\nversion: 2\nsummary: this is a summary\n",
            "/pkg",
        )
        .unwrap();
        assert_eq!(spec.name, "some_gem");
        assert_eq!(spec.version, "2");
        assert_eq!(spec.summary, "this is a summary");
        assert!(spec.licenses.is_empty());
        assert_eq!(spec.signing, Signing::Unsigned);
        assert_eq!(spec.base_dir, PathBuf::from("/pkg"));
    }

    #[test]
    fn test_date_literal_kept_verbatim() {
        let spec = parse_spec("name: a\nversion: '1'\ndate: 2010-11-8\n", ".").unwrap();
        assert_eq!(spec.date.as_deref(), Some("2010-11-8"));

        let spec = parse_spec("name: a\nversion: '1'\ndate: \"2010-11-08\"\n", ".").unwrap();
        assert_eq!(spec.date.as_deref(), Some("2010-11-08"));
    }

    #[test]
    fn test_fractional_version_rejected() {
        let err = parse_spec("name: a\nversion: 1.10\n", ".").unwrap_err();
        assert!(err.contains("quote it"), "{err}");
        let spec = parse_spec("name: a\nversion: '1.10'\n", ".").unwrap();
        assert_eq!(spec.version, "1.10");
    }

    #[test]
    fn test_signing_material_becomes_request() {
        let spec = parse_spec(
            "name: a\nversion: '1'\nsigning_key: k.pem\ncert_chain: [c.json]\n",
            ".",
        )
        .unwrap();
        assert_eq!(
            spec.signing,
            Signing::Request(SigningRequest {
                key: PathBuf::from("k.pem"),
                chain: vec![PathBuf::from("c.json")],
            })
        );

        let chain_only = parse_spec("name: a\nversion: '1'\ncert_chain: [c.json]\n", ".").unwrap();
        assert_eq!(chain_only.signing, Signing::Unsigned);
    }

    #[test]
    fn test_license_shorthand_merges() {
        let spec = parse_spec(
            "name: a\nversion: '1'\nlicense: MIT\nlicenses: [Apache-2.0]\n",
            ".",
        )
        .unwrap();
        assert_eq!(spec.licenses, vec!["MIT", "Apache-2.0"]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(parse_spec("name: a\nversion: '1'\nrubyforge: x\n", ".").is_err());
    }

    #[test]
    fn test_resolve_spec_path_with_and_without_extension() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("some_gem");
        let with_ext = tmp.path().join("some_gem.balespec");
        fs::write(&with_ext, "name: some_gem\n").unwrap();

        assert_eq!(resolve_spec_path(&base).unwrap(), with_ext);
        assert_eq!(resolve_spec_path(&with_ext).unwrap(), with_ext);

        let missing = tmp.path().join("other_gem");
        assert!(matches!(
            resolve_spec_path(&missing),
            Err(BuildError::FileNotFound { path }) if path == missing
        ));
    }

    #[test]
    fn test_load_spec_sets_base_dir() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.balespec");
        fs::write(&path, "name: a\nversion: '1'\n").unwrap();

        let spec = load_spec(&path).unwrap();
        assert_eq!(spec.base_dir, tmp.path());

        fs::write(&path, "name: [unclosed\n").unwrap();
        let err = load_spec(&path).unwrap_err();
        assert!(err.reason.contains("invalid spec YAML"));
    }
}
