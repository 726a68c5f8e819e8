//! Dot-path utilities.
//!
//! A path is a sequence of keys joined with `.`, for example
//! `"inventory.3.name"`. Keys addressing a mapping are the literal map key;
//! keys addressing a sequence are unsigned decimal indices. Dots inside keys
//! cannot be escaped.
//!
//! # Example
//!
//! ```
//! use datatree_path::{format_path, parse_index, parse_path};
//!
//! let path = parse_path("inventory.3.name");
//! assert_eq!(path, vec!["inventory", "3", "name"]);
//! assert_eq!(parse_index(&path[1]), Some(3));
//! assert_eq!(format_path(&path), "inventory.3.name");
//! ```

pub mod key;

pub use key::{is_valid_key, is_valid_key_char};

use thiserror::Error;

/// Separator between path keys.
pub const SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathSyntaxError {
    #[error("empty segment at position {0}")]
    EmptySegment(usize),
    #[error("path has no parent")]
    NoParent,
}

/// Splits a path into keys. Empty segments are dropped, so `""` yields no
/// keys and `"a..b"` yields `["a", "b"]`.
///
/// ```
/// use datatree_path::parse_path;
///
/// assert!(parse_path("").is_empty());
/// assert_eq!(parse_path("a..b"), vec!["a", "b"]);
/// ```
pub fn parse_path(path: &str) -> Vec<String> {
    path.split(SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Like [`parse_path`] but rejects empty segments.
///
/// ```
/// use datatree_path::{parse_path_strict, PathSyntaxError};
///
/// assert_eq!(parse_path_strict("a.b").unwrap(), vec!["a", "b"]);
/// assert_eq!(parse_path_strict("a..b"), Err(PathSyntaxError::EmptySegment(1)));
/// ```
pub fn parse_path_strict(path: &str) -> Result<Vec<String>, PathSyntaxError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    path.split(SEPARATOR)
        .enumerate()
        .map(|(position, segment)| {
            if segment.is_empty() {
                Err(PathSyntaxError::EmptySegment(position))
            } else {
                Ok(segment.to_string())
            }
        })
        .collect()
}

/// Joins keys with `.`.
pub fn format_path<S: AsRef<str>>(keys: &[S]) -> String {
    let mut out = String::new();
    for key in keys {
        if !out.is_empty() {
            out.push(SEPARATOR);
        }
        out.push_str(key.as_ref());
    }
    out
}

/// Appends `key` to `base`, omitting the separator when `base` is empty.
///
/// ```
/// use datatree_path::join;
///
/// assert_eq!(join("", "a"), "a");
/// assert_eq!(join("a", "b"), "a.b");
/// ```
pub fn join(base: &str, key: &str) -> String {
    if base.is_empty() {
        return key.to_string();
    }
    if key.is_empty() {
        return base.to_string();
    }
    let mut out = String::with_capacity(base.len() + key.len() + 1);
    out.push_str(base);
    out.push(SEPARATOR);
    out.push_str(key);
    out
}

/// Parses a sequence index. Only unsigned decimal without sign or leading
/// zeros is accepted.
///
/// ```
/// use datatree_path::parse_index;
///
/// assert_eq!(parse_index("0"), Some(0));
/// assert_eq!(parse_index("42"), Some(42));
/// assert_eq!(parse_index("-1"), None);
/// assert_eq!(parse_index("+1"), None);
/// assert_eq!(parse_index("01"), None);
/// assert_eq!(parse_index("1.5"), None);
/// assert_eq!(parse_index(""), None);
/// ```
pub fn parse_index(key: &str) -> Option<usize> {
    let bytes = key.as_bytes();
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return None;
    }
    key.parse().ok()
}

/// Returns the path without its last key.
///
/// ```
/// use datatree_path::parent;
///
/// assert_eq!(parent("a.b.c").unwrap(), "a.b");
/// assert_eq!(parent("a").unwrap(), "");
/// assert!(parent("").is_err());
/// ```
pub fn parent(path: &str) -> Result<&str, PathSyntaxError> {
    if path.is_empty() {
        return Err(PathSyntaxError::NoParent);
    }
    Ok(match path.rfind(SEPARATOR) {
        Some(position) => &path[..position],
        None => "",
    })
}

/// Returns the last key of the path, if any.
pub fn last_key(path: &str) -> Option<&str> {
    path.rsplit(SEPARATOR).find(|segment| !segment.is_empty())
}

/// Returns `true` when `child` lies strictly below `parent`.
///
/// ```
/// use datatree_path::is_child;
///
/// assert!(is_child("a", "a.b"));
/// assert!(is_child("", "a"));
/// assert!(!is_child("a", "ab"));
/// assert!(!is_child("a.b", "a"));
/// ```
pub fn is_child(parent: &str, child: &str) -> bool {
    let parent_keys = parse_path(parent);
    let child_keys = parse_path(child);
    parent_keys.len() < child_keys.len()
        && parent_keys.iter().zip(child_keys.iter()).all(|(a, b)| a == b)
}
