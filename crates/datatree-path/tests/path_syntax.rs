use datatree_path::{format_path, is_valid_key, join, last_key, parse_index, parse_path};
use proptest::prelude::*;

#[test]
fn single_key_path() {
    assert_eq!(parse_path("root"), vec!["root"]);
    assert_eq!(last_key("root"), Some("root"));
}

#[test]
fn leading_and_trailing_dots_are_ignored() {
    assert_eq!(parse_path(".a.b."), vec!["a", "b"]);
    assert_eq!(last_key("a.b."), Some("b"));
}

#[test]
fn index_overflow_is_rejected() {
    assert_eq!(parse_index("99999999999999999999999999"), None);
}

#[test]
fn join_builds_nested_path() {
    let path = join(&join("inventory", "3"), "name");
    assert_eq!(path, "inventory.3.name");
}

proptest! {
    #[test]
    fn property_format_parse_roundtrip(
        keys in proptest::collection::vec("[A-Za-z0-9_-]{1,8}", 0..6),
    ) {
        let text = format_path(&keys);
        prop_assert_eq!(parse_path(&text), keys.clone());
        for key in &keys {
            prop_assert!(is_valid_key(key));
        }
    }

    #[test]
    fn property_index_matches_display(n in any::<u32>()) {
        prop_assert_eq!(parse_index(&n.to_string()), Some(n as usize));
    }
}
