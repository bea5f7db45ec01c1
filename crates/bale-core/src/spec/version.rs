//! Package version token.
//!
//! Grammar: `[0-9]+(\.[0-9A-Za-z]+)*(-[0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*)?`,
//! surrounding whitespace ignored. A `-` starts a prerelease, so `1.0-beta`
//! orders exactly like `1.0.pre.beta`.
//!
//! Ordering works on canonical segments: trailing zero segments are dropped
//! (`1.0 == 1`), numbers compare numerically, and a letter segment sorts below
//! any number (`1.0.a < 1.0`).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9]+(\.[0-9A-Za-z]+)*(-[0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*)?$")
            .expect("static version pattern compiles")
    })
}

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9]+|[A-Za-z]+").expect("static segment pattern"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Num(u64),
    Str(String),
}

const ZERO: Segment = Segment::Num(0);

impl Segment {
    fn is_zero(&self) -> bool {
        matches!(self, Segment::Num(0))
    }

    fn cmp_to(&self, other: &Segment) -> Ordering {
        match (self, other) {
            (Segment::Num(a), Segment::Num(b)) => a.cmp(b),
            (Segment::Str(a), Segment::Str(b)) => a.cmp(b),
            (Segment::Str(_), Segment::Num(_)) => Ordering::Less,
            (Segment::Num(_), Segment::Str(_)) => Ordering::Greater,
        }
    }
}

/// A parsed, comparable version.
#[derive(Clone)]
pub struct Version {
    source: String,
    canonical: Vec<Segment>,
}

impl Version {
    /// Parse a version string.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let source = input.trim();
        if !version_pattern().is_match(source) {
            return Err(ValidationError::InvalidVersion {
                version: input.to_string(),
            });
        }

        let expanded = source.replace('-', ".pre.");
        let mut segments = Vec::new();
        for m in segment_pattern().find_iter(&expanded) {
            let text = m.as_str();
            let segment = if text.as_bytes()[0].is_ascii_digit() {
                let n = text
                    .parse::<u64>()
                    .map_err(|_| ValidationError::InvalidVersion {
                        version: input.to_string(),
                    })?;
                Segment::Num(n)
            } else {
                Segment::Str(text.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            source: source.to_string(),
            canonical: canonicalize(segments),
        })
    }

    /// The version as written (trimmed).
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Drop trailing zeros from the release part and from the prerelease part.
fn canonicalize(segments: Vec<Segment>) -> Vec<Segment> {
    let split = segments
        .iter()
        .position(|s| matches!(s, Segment::Str(_)))
        .unwrap_or(segments.len());
    let (release, pre) = segments.split_at(split);

    let trim = |part: &[Segment]| -> Vec<Segment> {
        let end = part
            .iter()
            .rposition(|s| !s.is_zero())
            .map_or(0, |i| i + 1);
        part[..end].to_vec()
    };

    let mut out = trim(release);
    out.extend(trim(pre));
    out
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.canonical.len().max(other.canonical.len());
        for i in 0..len {
            let lhs = self.canonical.get(i).unwrap_or(&ZERO);
            let rhs = other.canonical.get(i).unwrap_or(&ZERO);
            match lhs.cmp_to(rhs) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({:?})", self.source)
    }
}

impl FromStr for Version {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_accepts_common_forms() {
        for ok in ["2", "1.0", "1.2.3", "0.0.1.alpha", "1.0-beta", " 3.1 ", "1.0.rc1"] {
            assert!(Version::parse(ok).is_ok(), "{ok} should parse");
        }
        assert_eq!(v(" 3.1 ").as_str(), "3.1");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "junk", "1..2", ".1", "1.", "1.0 beta", "v1.0"] {
            assert!(
                matches!(
                    Version::parse(bad),
                    Err(ValidationError::InvalidVersion { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_trailing_zeros_are_equal() {
        assert_eq!(v("1.0"), v("1"));
        assert_eq!(v("1.0.0"), v("1"));
        assert_eq!(v("2").to_string(), "2");
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(v("1.10") > v("1.9"));
        assert!(v("2") > v("1.99.99"));
        assert!(v("0.0.1") < v("0.1"));
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        assert!(v("1.0.a") < v("1.0"));
        assert!(v("1.0-beta") < v("1.0"));
        assert!(v("1.0.a") < v("1.0.b"));
        assert_eq!(v("1.0-beta"), v("1.0.pre.beta"));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&v("1.2")).unwrap();
        assert_eq!(json, "\"1.2\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("1.2"));
        assert!(serde_json::from_str::<Version>("\"nope\"").is_err());
    }
}
