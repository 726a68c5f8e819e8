//! Mapping key validation.

/// Characters allowed in a mapping key.
#[inline]
pub fn is_valid_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// A mapping key is non-empty and made of `[A-Za-z0-9_-]`, so it can always
/// be used as a path segment.
///
/// ```
/// use datatree_path::is_valid_key;
///
/// assert!(is_valid_key("sword_01"));
/// assert!(is_valid_key("a-b"));
/// assert!(!is_valid_key(""));
/// assert!(!is_valid_key("a.b"));
/// assert!(!is_valid_key("a b"));
/// ```
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(is_valid_key_char)
}
