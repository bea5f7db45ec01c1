//! Process exit codes for `bale`.
//! These are part of the public contract; `BaleError::exit_code` maps onto them.

pub const SUCCESS: i32 = 0;
pub const SPEC_ERROR: i32 = 1; // Spec missing, unparsable or invalid
pub const OUTPUT_ERROR: i32 = 2; // Archive could not be written
pub const SIGNING_ERROR: i32 = 3; // Key or certificate problem
pub const NOT_VERIFIED: i32 = 4; // Archive rejected by the security policy
pub const TRUST_ERROR: i32 = 5; // Trust store unusable
