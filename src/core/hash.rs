// Hashing utilities for ledger objects

use sha2::{Digest, Sha256};
use std::fmt::{Display, Write};

/// Single SHA256 hash, hex encoded (64 lowercase characters)
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash the concatenation of `parts` rendered with `Display`.
///
/// Numbers render as base-10 digits with no separators, so the preimage of
/// `hash_parts(&[&1u64, &"ab", &20u32])` is exactly `"1ab20"`. Callers fix the
/// order of the parts; that byte sequence is consensus relevant.
pub fn hash_parts(parts: &[&dyn Display]) -> String {
    let mut preimage = String::new();
    for part in parts {
        // Writing into a String cannot fail
        let _ = write!(preimage, "{}", part);
    }
    sha256_hex(preimage.as_bytes())
}

/// Whether `s` looks like a SHA256 hex digest
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
