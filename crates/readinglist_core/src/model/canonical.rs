//! Name canonicalization for reading list uniqueness checks.
//!
//! # Rule
//! 1. Surrounding whitespace is trimmed.
//! 2. The name is composed to Unicode NFC, so `"e\u{301}"` and `"é"` agree.
//! 3. The composed form is lowercased.
//!
//! Diacritics are significant: `"pebbles"` and `"pebblés"` produce different
//! keys, while `"pebbles"` and `"pEbBLes"` collide.

use unicode_normalization::UnicodeNormalization;

/// Returns the comparison key for a user-supplied list name.
///
/// Pure and infallible. The result is never shown to users.
pub fn canonicalize_name(name: &str) -> String {
    let composed: String = name.trim().nfc().collect();
    // Lowercasing can emit combining sequences (e.g. `İ`), recompose them.
    composed.to_lowercase().nfc().collect()
}

/// Returns whether two names map to the same canonical key.
pub fn names_collide(left: &str, right: &str) -> bool {
    canonicalize_name(left) == canonicalize_name(right)
}
