/// KV key layout of the descriptor store.
///
/// ```text
/// face:id:{key}    -> JSON Identity
/// face:meta:dim    -> embedding dimension, decimal
/// ```
///
/// `{key}` is a normalized identity key, see [`normalize_key`].
pub const IDENTITY_PREFIX: &str = "face:id:";

/// KV key holding the store-wide embedding dimension.
pub const DIMENSION_KEY: &str = "face:meta:dim";

/// Character that replaces each run of whitespace inside a key.
pub const KEY_SEPARATOR: char = ' ';

/// KV key for an identity. Format: "face:id:{key}"
pub fn identity_key(key: &str) -> String {
    format!("{IDENTITY_PREFIX}{key}")
}

/// Derive the identity key from a display name.
///
/// Trims, lower-cases and collapses every internal whitespace run to a
/// single [`KEY_SEPARATOR`]. Names that normalize to the same key are the
/// same person. Returns an empty string for blank input.
pub fn normalize_key(name: &str) -> String {
    collapse_whitespace(name).to_lowercase()
}

/// Trim a display name and collapse internal whitespace, keeping its case.
pub fn normalize_display_name(name: &str) -> String {
    collapse_whitespace(name)
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push(KEY_SEPARATOR);
        }
        out.push_str(word);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_variants_collide() {
        assert_eq!(normalize_key("Jane Doe"), "jane doe");
        assert_eq!(normalize_key("  jane   doe "), "jane doe");
        assert_eq!(normalize_key("JANE\tDOE\n"), "jane doe");
    }

    #[test]
    fn normalize_blank() {
        assert_eq!(normalize_key(""), "");
        assert_eq!(normalize_key("   \t "), "");
    }

    #[test]
    fn display_name_keeps_case() {
        assert_eq!(normalize_display_name("  Jane   Doe "), "Jane Doe");
    }

    #[test]
    fn identity_key_format() {
        assert_eq!(identity_key("alice"), "face:id:alice");
        assert!(identity_key("jane doe").starts_with(IDENTITY_PREFIX));
    }
}
