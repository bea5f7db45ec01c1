//! Specification validation.
//!
//! Pure checks over an in-memory [`Specification`], run before any archive
//! work. Checks short-circuit: the first failure is the one reported.
//!
//! Order:
//! 1. name present, then well-formed
//! 2. version present, then parseable
//! 3. date literal (if any) matches fixed-width `YYYY-MM-DD` and is a real date
//! 4. summary present
//! 5. license length
//! 6. file paths relative, inside the package root, unique
//!
//! The date grammar is fixed-width: `2010-11-8` is rejected although it names
//! a real day.

use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path};
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use crate::archive::archive_file_name;
use crate::error::ValidationError;
use crate::spec::{Specification, Version};

/// Longest accepted license identifier.
pub const MAX_LICENSE_LENGTH: usize = 64;

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("static date pattern compiles")
    })
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static name pattern"))
}

/// Non-fatal findings, reported only after a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Warning {
    EmptyLicenseList,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::EmptyLicenseList => f.write_str("licenses is empty"),
        }
    }
}

/// A specification that passed validation, with its parsed fields.
#[derive(Debug, Clone)]
pub struct ValidatedSpec {
    spec: Specification,
    version: Version,
    date: Option<NaiveDate>,
    files: Vec<String>,
    warnings: Vec<Warning>,
}

impl ValidatedSpec {
    pub fn spec(&self) -> &Specification {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    /// File list with `./` and empty components removed, in declared order.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// `{name}-{version}.bale`
    pub fn file_name(&self) -> String {
        archive_file_name(self.name(), &self.version)
    }
}

/// Validate a specification.
pub fn validate(spec: &Specification) -> Result<ValidatedSpec, ValidationError> {
    check_name(&spec.name)?;

    if spec.version.trim().is_empty() {
        return Err(ValidationError::MissingField { field: "version" });
    }
    let version = Version::parse(&spec.version)?;

    let date = match &spec.date {
        Some(literal) => Some(parse_strict_date(literal)?),
        None => None,
    };

    if spec.summary.trim().is_empty() {
        return Err(ValidationError::MissingField { field: "summary" });
    }

    if let Some(license) = spec
        .licenses
        .iter()
        .find(|l| l.chars().count() > MAX_LICENSE_LENGTH)
    {
        return Err(ValidationError::LicenseTooLong {
            license: license.clone(),
        });
    }

    let files = normalize_files(&spec.files)?;

    let mut warnings = Vec::new();
    if spec.licenses.is_empty() {
        warnings.push(Warning::EmptyLicenseList);
    }

    Ok(ValidatedSpec {
        spec: spec.clone(),
        version,
        date,
        files,
        warnings,
    })
}

fn check_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::MissingField { field: "name" });
    }
    if !name.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidName {
            name: name.to_string(),
            reason: "must include at least one letter",
        });
    }
    if !name_pattern().is_match(name) {
        return Err(ValidationError::InvalidName {
            name: name.to_string(),
            reason: "can only include letters, numbers, dots, dashes, and underscores",
        });
    }
    Ok(())
}

/// Parse a `YYYY-MM-DD` literal with fixed-width fields.
pub fn parse_strict_date(literal: &str) -> Result<NaiveDate, ValidationError> {
    let invalid = || ValidationError::InvalidDateFormat {
        literal: literal.to_string(),
    };
    if !date_pattern().is_match(literal) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(literal, "%Y-%m-%d").map_err(|_| invalid())
}

fn normalize_files(files: &[String]) -> Result<Vec<String>, ValidationError> {
    let mut seen = HashSet::with_capacity(files.len());
    let mut out = Vec::with_capacity(files.len());

    for raw in files {
        let unsafe_path = || ValidationError::UnsafePath { path: raw.clone() };
        let mut parts = Vec::new();
        for component in Path::new(raw).components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str().ok_or_else(unsafe_path)?),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(unsafe_path())
                }
            }
        }
        if parts.is_empty() {
            return Err(unsafe_path());
        }

        let normalized = parts.join("/");
        if !seen.insert(normalized.clone()) {
            return Err(ValidationError::DuplicateFile { path: raw.clone() });
        }
        out.push(normalized);
    }

    Ok(out)
}
