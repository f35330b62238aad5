//! Cache key derivation.
//!
//! Keys are hex SHA-256 digests and can only be built through the
//! constructors here, so every caller applies the same normalization:
//! text inputs are trimmed, joined with `|` (missing job context becomes
//! the `no-job` placeholder) and lowercased before hashing. File digests
//! hash the raw bytes untouched.

use std::fmt;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest identifying one cacheable computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn digest(bytes: &[u8]) -> CacheKey {
    CacheKey(hex::encode(Sha256::digest(bytes)))
}

/// Key for a text computation of the given kind (`roast`, `cover_letter`,
/// ...) over a resume and optional job context.
pub fn content_key(kind: &str, resume_text: &str, job_context: Option<&str>) -> CacheKey {
    let job = job_context
        .map(str::trim)
        .filter(|j| !j.is_empty())
        .unwrap_or("no-job");
    let normalized = format!("{}|{}|{}", resume_text.trim(), job, kind).to_lowercase();
    digest(normalized.as_bytes())
}

/// Key for an uploaded file's extracted content, byte-exact.
pub fn file_key(bytes: &[u8]) -> CacheKey {
    digest(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_ignores_case_and_surrounding_whitespace() {
        let a = content_key("roast", "  Jane Doe\nSenior Engineer  ", None);
        let b = content_key("roast", "jane doe\nsenior engineer", None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_blank_job_context_matches_missing_job_context() {
        let none = content_key("roast", "resume", None);
        let blank = content_key("roast", "resume", Some("   "));
        assert_eq!(none, blank);

        let with_job = content_key("roast", "resume", Some("Staff SRE at Acme"));
        assert_ne!(none, with_job);
    }

    #[test]
    fn test_kind_separates_otherwise_identical_inputs() {
        let roast = content_key("roast", "resume", None);
        let letter = content_key("cover_letter", "resume", None);
        assert_ne!(roast, letter);
    }

    #[test]
    fn test_keys_are_64_hex_chars() {
        let key = content_key("roast", "resume", None);
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_file_key_is_plain_sha256() {
        // SHA-256 of the empty input, pinned.
        assert_eq!(
            file_key(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_file_key_is_byte_exact_where_content_key_normalizes() {
        assert_ne!(file_key(b"Resume"), file_key(b"resume"));
        assert_eq!(
            content_key("roast", "Resume", None),
            content_key("roast", "resume", None)
        );
    }
}
