//! Slug derivation for public menu URLs
//!
//! A slug is the URL-safe identity of a restaurant, derived from its name:
//! lowercase, apostrophes and any other character outside `[a-z0-9 -]`
//! removed, whitespace runs collapsed to single hyphens, hyphen runs
//! collapsed, leading and trailing hyphens trimmed. Non-ASCII letters are
//! stripped rather than transliterated. Renaming a restaurant re-derives
//! the slug; collision handling lives in the repository.

/// Fallback when a name strips down to nothing
pub const EMPTY_SLUG_FALLBACK: &str = "menu";

/// Derive a URL-safe slug from a restaurant name
pub fn derive_slug(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();

    let mut slug = String::with_capacity(cleaned.len());
    let mut last_was_hyphen = true; // swallows leading hyphens

    for c in cleaned.chars() {
        if c.is_whitespace() || c == '-' {
            if !last_was_hyphen {
                slug.push('-');
                last_was_hyphen = true;
            }
        } else {
            slug.push(c);
            last_was_hyphen = false;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        EMPTY_SLUG_FALLBACK.to_string()
    } else {
        slug
    }
}
