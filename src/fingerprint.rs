// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Fingerprint comparison helpers.
//!
//! Fingerprints travel as hex strings between devices, the collector and the
//! ledger. Hex is compared case-insensitively; anything else byte-for-byte.

use alloc::string::String;

/// Size of a digest fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 32;

/// Compares two fingerprints.
///
/// Hex-encoded values are equal regardless of letter case. Non-hex values
/// fall back to exact comparison. Empty strings never match anything.
pub fn fingerprints_match(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if is_hex(a) && is_hex(b) {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

/// Same as [`fingerprints_match`] but a missing side is a guaranteed mismatch.
pub fn optional_match(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => fingerprints_match(a, b),
        _ => false,
    }
}

pub fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Lowercase hex form used for storage keys and ledger submission.
pub fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

/// Hex fingerprint of a 32-byte digest.
pub fn to_hex(digest: &[u8; FINGERPRINT_LEN]) -> String {
    hex::encode(digest)
}

/// True for a 64-character hex string (a 32-byte digest).
pub fn is_digest_hex(s: &str) -> bool {
    s.len() == FINGERPRINT_LEN * 2 && is_hex(s)
}
