//! Canonical string encoding and the double SHA-256 digest used for every identifier.
//!
//! Field tuples are joined with a single-character separator; different structural
//! levels use different separators (`~` outputs, `-` transactions, `` ` `` headers,
//! `;` and `!` for lists). No escaping is performed, so a value that itself contains
//! the separator produces an ambiguous encoding.

use sha2::{Digest, Sha256};
use std::fmt::Display;

/// Hex-encoded double SHA-256 digest.
pub type HexHash = String;

/// Joins the string form of each value with `sep`.
pub fn encode_as_str<I>(values: I, sep: &str) -> String
where
    I: IntoIterator,
    I::Item: Display,
{
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// SHA-256 over the UTF-8 bytes of `input`, then SHA-256 over the raw first digest.
pub fn sha256_2_string(input: &str) -> HexHash {
    let first = Sha256::digest(input.as_bytes());
    let second = Sha256::digest(first);
    hex::encode(second)
}
