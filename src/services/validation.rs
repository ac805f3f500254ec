//! Bucket name validation.
//!
//! Names become directory names under the data dir, so the accepted set is
//! deliberately narrow: 3–63 characters drawn from lowercase ASCII letters,
//! digits, `-` and `.`, with no leading/trailing hyphen and no doubled
//! separators.

use thiserror::Error;

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// The rule a rejected bucket name broke. Rules are checked in declaration
/// order and the first failure is reported.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NameViolation {
    #[error("name must be between 3 and 63 characters")]
    Length,
    #[error("name must not begin or end with a hyphen")]
    EdgeHyphen,
    #[error("name must not contain consecutive hyphens")]
    ConsecutiveHyphens,
    #[error("name must not contain consecutive periods")]
    ConsecutivePeriods,
    #[error("allowed characters are lowercase letters, digits, hyphens, and periods")]
    InvalidCharacter,
}

/// Validate bucket name syntax. Pure and total.
pub fn validate_bucket_name(name: &str) -> Result<(), NameViolation> {
    let len = name.chars().count();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(NameViolation::Length);
    }

    if name.starts_with('-') || name.ends_with('-') {
        return Err(NameViolation::EdgeHyphen);
    }

    if name.contains("--") {
        return Err(NameViolation::ConsecutiveHyphens);
    }

    if name.contains("..") {
        return Err(NameViolation::ConsecutivePeriods);
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(NameViolation::InvalidCharacter);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        let longest = "a".repeat(63);
        for name in [
            "abc",
            "my-bucket",
            "my.bucket.v2",
            "a-b.c-d",
            "123",
            ".dot-start",
            longest.as_str(),
        ] {
            assert_eq!(validate_bucket_name(name), Ok(()), "{name}");
        }
    }

    #[test]
    fn rejects_bad_length() {
        assert_eq!(validate_bucket_name("ab"), Err(NameViolation::Length));
        assert_eq!(validate_bucket_name(""), Err(NameViolation::Length));
        assert_eq!(
            validate_bucket_name(&"a".repeat(64)),
            Err(NameViolation::Length)
        );
    }

    #[test]
    fn rejects_edge_hyphens() {
        assert_eq!(
            validate_bucket_name("-bucket"),
            Err(NameViolation::EdgeHyphen)
        );
        assert_eq!(
            validate_bucket_name("bucket-"),
            Err(NameViolation::EdgeHyphen)
        );
    }

    #[test]
    fn rejects_doubled_separators() {
        assert_eq!(
            validate_bucket_name("my--bucket"),
            Err(NameViolation::ConsecutiveHyphens)
        );
        assert_eq!(
            validate_bucket_name("my..bucket"),
            Err(NameViolation::ConsecutivePeriods)
        );
    }

    #[test]
    fn rejects_disallowed_characters() {
        for name in ["MyBucket", "my_bucket", "my bucket", "bucket/x", "bückét"] {
            assert_eq!(
                validate_bucket_name(name),
                Err(NameViolation::InvalidCharacter),
                "{name}"
            );
        }
    }

    #[test]
    fn reason_is_human_readable() {
        let err = validate_bucket_name("x").unwrap_err();
        assert!(err.to_string().contains("3 and 63"));
    }
}
