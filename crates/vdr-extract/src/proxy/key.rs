//! Storage key sanitizing for the file proxy

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

fn safe_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9/_.\-]+$").expect("Invalid regex"))
}

/// Percent-decode a requested key, drop leading slashes and enforce the allow-list
///
/// Any violation is a validation error; callers must not touch storage first.
pub fn sanitize_key(raw: &str) -> Result<String> {
    let decoded = urlencoding::decode(raw)
        .map_err(|_| Error::validation("invalid key: not valid UTF-8"))?;
    let key = decoded.trim_start_matches('/');

    if key.contains("..") || !safe_key_pattern().is_match(key) {
        return Err(Error::validation(format!("invalid key '{}'", raw)));
    }
    Ok(key.to_string())
}
