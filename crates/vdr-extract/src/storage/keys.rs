//! Deterministic object key layout

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

fn doc_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("Invalid regex"))
}

/// Fresh document id: 32 lowercase hex characters
pub fn new_doc_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Reject ids that could not have been minted by `new_doc_id`-style schemes
pub fn validate_doc_id(doc_id: &str) -> Result<()> {
    if doc_id_pattern().is_match(doc_id) {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid doc_id '{}'", doc_id)))
    }
}

pub fn original_key(doc_id: &str) -> String {
    format!("docs/{}/original.pdf", doc_id)
}

pub fn manifest_key(doc_id: &str) -> String {
    format!("docs/{}/manifest.json", doc_id)
}

pub fn chunk_pdf_key(doc_id: &str, index: u32) -> String {
    format!("docs/{}/chunks/chunk-{:04}.pdf", doc_id, index)
}

pub fn chunk_meta_key(doc_id: &str, index: u32) -> String {
    format!("docs/{}/chunks/chunk-{:04}.json", doc_id, index)
}

pub fn chunk_text_key(doc_id: &str, index: u32) -> String {
    format!("docs/{}/texts/chunk-{:04}.jsonl", doc_id, index)
}

/// Proxy download URL for a stored key
pub fn proxy_url(key: &str) -> String {
    format!("/files/proxy?key={}", key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(original_key("abc"), "docs/abc/original.pdf");
        assert_eq!(manifest_key("abc"), "docs/abc/manifest.json");
        assert_eq!(chunk_pdf_key("abc", 1), "docs/abc/chunks/chunk-0001.pdf");
        assert_eq!(chunk_meta_key("abc", 12), "docs/abc/chunks/chunk-0012.json");
        assert_eq!(chunk_text_key("abc", 3), "docs/abc/texts/chunk-0003.jsonl");

        let all = [
            original_key("abc"),
            manifest_key("abc"),
            chunk_pdf_key("abc", 1),
            chunk_meta_key("abc", 1),
            chunk_text_key("abc", 1),
        ];
        assert!(all.iter().all(|key| key.starts_with("docs/abc/")));
    }

    #[test]
    fn test_index_wider_than_padding() {
        assert_eq!(chunk_pdf_key("abc", 12345), "docs/abc/chunks/chunk-12345.pdf");
    }

    #[test]
    fn test_doc_id_validation() {
        assert!(validate_doc_id(&new_doc_id()).is_ok());
        assert!(validate_doc_id("report_2024-v2").is_ok());
        assert!(validate_doc_id("").is_err());
        assert!(validate_doc_id("../etc").is_err());
        assert!(validate_doc_id("a/b").is_err());
        assert!(validate_doc_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_new_doc_id_is_hex() {
        let id = new_doc_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
