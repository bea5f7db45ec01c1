//! JSON Canonicalization Scheme (RFC 8785).
//!
//! Every byte string that gets hashed or signed goes through here:
//!
//! - Lexicographic key ordering
//! - No insignificant whitespace
//! - UTF-8 encoding

use serde::Serialize;

/// Serialize a value to JCS canonical JSON bytes.
///
/// # Example
///
/// ```
/// use bale_core::crypto::jcs;
/// use serde_json::json;
///
/// let bytes = jcs::to_vec(&json!({"b": 2, "a": 1})).unwrap();
/// assert_eq!(bytes, br#"{"a":1,"b":2}"#);
/// ```
pub fn to_vec<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    serde_jcs::to_vec(value)
}

/// Serialize to a JCS canonical JSON string.
pub fn to_string<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_jcs::to_string(value)
}
