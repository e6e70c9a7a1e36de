//! Slug derivation from titles.

/// Derives a lowercase kebab-case slug from a title.
///
/// Alphanumeric runs are kept, everything else collapses to a single hyphen.
/// Returns an empty string when the title has no alphanumeric content.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}
