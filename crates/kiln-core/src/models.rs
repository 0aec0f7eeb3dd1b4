//! Domain models for Kiln.
//!
//! These are the core types shared across all crates. Every persisted
//! entity comes with a `Create*` input and, where the entity is mutable, an
//! `Update*` input whose `None` fields mean "no change".

pub mod api_key;
pub mod certificate;
pub mod claim;
pub mod migration;
pub mod role;
pub mod tenant;
pub mod user;

/// Lowercase, ASCII-alphanumeric slug with single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("T1 Int"), "t1-int");
        assert_eq!(slugify("  api.t1.local "), "api-t1-local");
        assert_eq!(slugify("Root"), "root");
        assert_eq!(slugify("--"), "");
    }
}
