//! Text normalization and content hashing helpers.

use serde::Serialize;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Comparison key for deduplicating free text (translations, examples).
pub fn normalize_text(value: &str) -> String {
    value.trim().nfc().collect::<String>().to_lowercase()
}

/// ASCII-safe slug of a lemma, e.g. `Größe` → `grosse`.
///
/// Lowercases, expands `ß`, decomposes (NFKD) and drops anything outside
/// ASCII, then collapses non-alphanumeric runs into single hyphens.
pub fn slugify(lemma: &str) -> String {
    let lowered = lemma.trim().to_lowercase().replace('ß', "ss");
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_dash = false;

    for c in lowered.nfkd() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c.is_ascii() {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "lexeme".to_string()
    } else {
        slug
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// First `len` hex characters of the SHA-256 of `input`.
pub fn short_hash(input: &str, len: usize) -> String {
    let mut hex = sha256_hex(input.as_bytes());
    hex.truncate(len);
    hex
}

/// SHA-256 over the JSON encoding of `value`.
///
/// Struct fields serialize in declaration order and maps are `BTreeMap`s,
/// so equal values always hash equally.
pub fn checksum_json<T: Serialize>(value: &T) -> String {
    // Serializing plain data with string keys cannot fail.
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    sha256_hex(&bytes)
}
