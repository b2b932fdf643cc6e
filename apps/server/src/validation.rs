use unicode_normalization::UnicodeNormalization;
use validator::ValidationError;

pub const MAX_BIO_LEN: usize = 500;
pub const MAX_POST_LEN: usize = 2000;
pub const MAX_COMMENT_LEN: usize = 500;
/// Leaves room for a `-N` suffix inside the 170 character slug column.
const MAX_SLUG_BASE_LEN: usize = 150;
const MAX_IMAGE_REF_LEN: usize = 1024;
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 150 {
        return Err(ValidationError::new("username_length"));
    }

    if !trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(ValidationError::new("username_chars"));
    }

    Ok(())
}

pub fn validate_post_content(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || value.chars().count() > MAX_POST_LEN {
        return Err(ValidationError::new("post_content_length"));
    }
    Ok(())
}

pub fn validate_comment_content(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || value.chars().count() > MAX_COMMENT_LEN {
        return Err(ValidationError::new("comment_content_length"));
    }
    Ok(())
}

pub fn validate_bio(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() > MAX_BIO_LEN {
        return Err(ValidationError::new("bio_length"));
    }
    Ok(())
}

/// Picture and image fields hold a reference to an uploaded file; only
/// jpg/jpeg/png files are accepted.
pub fn validate_image_ref(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("image_empty"));
    }
    if trimmed.len() > MAX_IMAGE_REF_LEN {
        return Err(ValidationError::new("image_length"));
    }

    let path = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ValidationError::new("image_extension"));
    }
    Ok(())
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn normalize_username(value: &str) -> String {
    value.trim().to_string()
}

/// URL-safe form of `value`: folded to ASCII, lowercase, word characters and
/// hyphens only, runs of whitespace or hyphens collapsed to a single hyphen,
/// no leading or trailing `-` or `_`. Characters with no ASCII decomposition
/// are dropped; an empty result becomes `user`.
pub fn slugify(value: &str) -> String {
    let ascii: String = value.nfkd().filter(char::is_ascii).collect();
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;

    for c in ascii.trim().chars().map(|c| c.to_ascii_lowercase()) {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c == '-' || c.is_ascii_whitespace() {
            pending_dash = true;
        }
    }

    slug.truncate(MAX_SLUG_BASE_LEN);
    let slug = slug.trim_matches(|c: char| c == '-' || c == '_');
    if slug.is_empty() {
        "user".to_string()
    } else {
        slug.to_string()
    }
}

/// The `attempt`-th candidate slug: the base itself first, then `base-1`,
/// `base-2`, and so on.
pub fn slug_candidate(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{base}-{attempt}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_validation_allows_expected_chars() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("bob-the-builder").is_ok());
        assert!(validate_username("carol@example.com").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("bad!name").is_err());
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Alice Smith"), "alice-smith");
        assert_eq!(slugify("bob--the  builder"), "bob-the-builder");
        assert_eq!(slugify("carol@example.com"), "carolexamplecom");
        assert_eq!(slugify("-dave-"), "dave");
        assert_eq!(slugify("@@@"), "user");
    }

    #[test]
    fn slugify_folds_to_ascii_and_trims_both_separators() {
        assert_eq!(slugify("José"), "jose");
        assert_eq!(slugify("Ærøskøbing Ünïcode"), "rskbing-unicode");
        assert_eq!(slugify("_-a"), "a");
        assert_eq!(slugify("a_-"), "a");
        assert_eq!(slugify("李雷"), "user");

        let long = slugify(&"İ".repeat(150));
        assert_eq!(long, "i".repeat(150));
        assert!(long.is_ascii());

        let capped = slugify(&format!("{}-tail", "a".repeat(149)));
        assert!(capped.len() <= MAX_SLUG_BASE_LEN);
        assert!(!capped.ends_with('-'));
    }

    #[test]
    fn slug_candidates_count_up_from_the_base() {
        assert_eq!(slug_candidate("alice", 0), "alice");
        assert_eq!(slug_candidate("alice", 1), "alice-1");
        assert_eq!(slug_candidate("alice", 12), "alice-12");
    }

    #[test]
    fn image_refs_require_known_extension() {
        assert!(validate_image_ref("post_images/cat.JPG").is_ok());
        assert!(validate_image_ref("https://cdn.example.com/a.png?size=2").is_ok());
        assert!(validate_image_ref("profile_pics/me.gif").is_err());
        assert!(validate_image_ref("noextension").is_err());
        assert!(validate_image_ref("  ").is_err());
    }

    #[test]
    fn content_validation_rejects_blank_and_oversized() {
        assert!(validate_post_content("hello").is_ok());
        assert!(validate_post_content("   ").is_err());
        assert!(validate_post_content(&"x".repeat(MAX_POST_LEN + 1)).is_err());
        assert!(validate_comment_content(&"x".repeat(MAX_COMMENT_LEN)).is_ok());
        assert!(validate_comment_content(&"x".repeat(MAX_COMMENT_LEN + 1)).is_err());
        assert!(validate_bio("").is_ok());
    }
}
