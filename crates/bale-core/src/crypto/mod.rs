//! Hashing, canonical JSON and key helpers shared by the archive, signing and
//! verification code.

pub mod digest;
pub mod jcs;
pub mod keys;

pub use digest::{sha256_prefixed, HashingWriter, PayloadDigest};
