//! Content fingerprints for change detection.
//!
//! A fingerprint is the SHA-256 of `title + "\n\n" + text`. It is only an
//! equality oracle: two articles with the same fingerprint are treated as
//! unchanged and are not re-embedded.

use sha2::{Digest, Sha256};

/// Separator placed between title and body, both for hashing and for the
/// text handed to the embedding service.
pub const TITLE_SEPARATOR: &str = "\n\n";

/// Compute the hex SHA-256 fingerprint of an article's title and body.
///
/// An absent title hashes the same as an empty one.
pub fn fingerprint(title: Option<&str>, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.unwrap_or("").as_bytes());
    hasher.update(TITLE_SEPARATOR.as_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Text sent to the embedding service for an article.
pub fn embedding_input(title: Option<&str>, text: &str) -> String {
    format!("{}{}{}", title.unwrap_or(""), TITLE_SEPARATOR, text)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn stable_for_identical_input() {
        let a = fingerprint(Some("Headline"), "Body text.");
        let b = fingerprint(Some("Headline"), "Body text.");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn absent_title_equals_empty_title() {
        assert_eq!(fingerprint(None, "x"), fingerprint(Some(""), "x"));
    }

    #[test]
    fn title_and_text_both_matter() {
        let base = fingerprint(Some("Title"), "Text");
        assert_ne!(base, fingerprint(Some("Title!"), "Text"));
        assert_ne!(base, fingerprint(Some("Title"), "Text!"));
    }

    #[test]
    fn many_distinct_inputs_give_distinct_digests() {
        let mut seen = HashSet::new();
        for i in 0..500 {
            assert!(seen.insert(fingerprint(Some(&format!("title {}", i)), "same body")));
            assert!(seen.insert(fingerprint(Some("same title"), &format!("body {}", i))));
        }
    }

    #[test]
    fn embedding_input_joins_and_trims() {
        assert_eq!(embedding_input(Some("T"), "body"), "T\n\nbody");
        assert_eq!(embedding_input(None, "body "), "body");
    }
}
