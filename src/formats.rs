//! Identifier Shape Classifiers
//!
//! Pure predicates used to decide how a user-supplied token should be treated:
//! - [`looks_like_branch_id`] - opaque branch IDs (`br-wispy-meadow-118737`)
//! - [`looks_like_lsn`] - Postgres log sequence numbers (`0/1F56000`)
//! - [`looks_like_timestamp`] - ISO-8601 date-times
//!
//! Callers apply them in a fixed priority: LSN before timestamp when
//! classifying a point-in-time qualifier, ID before name lookup when
//! classifying a branch token.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// `br-` + two or more lowercase words + alphanumeric suffix (6+ chars)
static BRANCH_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^br-(?:[a-z]+-){2,}[a-z0-9]{6,}$").unwrap());

/// `{1-8 hex}/{1-8 hex}`
static LSN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{1,8}/[0-9a-fA-F]{1,8}$").unwrap());

/// Naive (zone-less) date-time layouts accepted after RFC 3339 fails.
const NAIVE_DATETIME_FORMATS: &[&str] =
    &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Check whether a string has the shape of an opaque branch ID.
#[must_use]
pub fn looks_like_branch_id(s: &str) -> bool {
    BRANCH_ID_REGEX.is_match(s)
}

/// Check whether a string is a Postgres LSN in `hi/lo` hexadecimal form.
#[must_use]
pub fn looks_like_lsn(s: &str) -> bool {
    LSN_REGEX.is_match(s)
}

/// Check whether a string parses as an ISO-8601 date-time.
#[must_use]
pub fn looks_like_timestamp(s: &str) -> bool {
    parse_timestamp(s).is_some()
}

/// Parse an ISO-8601 date-time, treating zone-less input as UTC.
///
/// Accepts full RFC 3339 (`2021-01-01T00:00:00Z`, `...+02:00`), zone-less
/// date-times and bare dates (midnight UTC).
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_id_short_suffix() {
        assert!(looks_like_branch_id("br-wispy-meadow-118737"));
        assert!(looks_like_branch_id("br-aged-salad-637688"));
    }

    #[test]
    fn test_branch_id_long_suffix() {
        assert!(looks_like_branch_id("br-bitter-frog-12345678"));
        assert!(looks_like_branch_id("br-cool-darkness-a5pk1mzb"));
        assert!(looks_like_branch_id("br-small-dew-drop-w2x4y6z8"));
    }

    #[test]
    fn test_branch_id_all_letter_suffix() {
        assert!(looks_like_branch_id("br-cool-darkness-abcdefgh"));
        assert!(looks_like_branch_id("br-my-feature-branch"));
    }

    #[test]
    fn test_branch_id_rejects_names() {
        for name in ["main", "dev", "feature-login", "my-branch-name", "preview-pr-1234567"] {
            assert!(!looks_like_branch_id(name), "{name} should not look like an id");
        }
    }

    #[test]
    fn test_branch_id_rejects_malformed() {
        assert!(!looks_like_branch_id("br-single-123456"));
        assert!(!looks_like_branch_id("br-wispy-meadow-1187"));
        assert!(!looks_like_branch_id("br-Wispy-meadow-118737"));
        assert!(!looks_like_branch_id("br-wispy--meadow-118737"));
        assert!(!looks_like_branch_id(""));
    }

    #[test]
    fn test_lsn() {
        assert!(looks_like_lsn("0/1F56000"));
        assert!(looks_like_lsn("0/123ABC"));
        assert!(looks_like_lsn("FFFFFFFF/ffffffff"));
        assert!(!looks_like_lsn("branch_name"));
        assert!(!looks_like_lsn("0/"));
        assert!(!looks_like_lsn("123456789/0"));
        assert!(!looks_like_lsn("0/1G"));
    }

    #[test]
    fn test_timestamp() {
        assert!(looks_like_timestamp("2021-01-01T00:00:00Z"));
        assert!(looks_like_timestamp("2021-01-01T00:00:00.123+02:00"));
        assert!(looks_like_timestamp("2021-01-01T12:30:00"));
        assert!(looks_like_timestamp("2021-01-01"));
        assert!(!looks_like_timestamp("not-a-valid-qualifier"));
        assert!(!looks_like_timestamp("2021-13-01"));
        assert!(!looks_like_timestamp(""));
    }

    #[test]
    fn test_parse_timestamp_normalizes_to_utc() {
        let ts = parse_timestamp("2021-01-01T02:00:00+02:00").unwrap();
        assert_eq!(ts, parse_timestamp("2021-01-01T00:00:00Z").unwrap());
        assert_eq!(parse_timestamp("2021-01-01").unwrap().to_rfc3339(), "2021-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_classifiers_are_disjoint_on_examples() {
        let id = "br-wispy-meadow-118737";
        assert!(!looks_like_lsn(id));
        assert!(!looks_like_timestamp(id));
        assert!(!looks_like_branch_id("0/1F56000"));
        assert!(!looks_like_timestamp("0/1F56000"));
    }
}
