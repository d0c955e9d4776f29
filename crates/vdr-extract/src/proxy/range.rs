//! Single-range `Range: bytes=start-end` handling

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::providers::ByteRange;

fn range_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^bytes=(\d*)-(\d*)$").expect("Invalid regex"))
}

/// Parsed bounds of a Range header; either may be absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// How a range applies to an object of known size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeResolution {
    Satisfiable(ByteRange),
    Unsatisfiable,
}

impl RangeRequest {
    /// Parse a header value; whitespace is ignored, anything else malformed is a 400
    pub fn parse(header: &str) -> Result<Self> {
        let compact: String = header.chars().filter(|c| !c.is_whitespace()).collect();
        let caps = range_pattern()
            .captures(&compact)
            .ok_or_else(|| Error::validation(format!("invalid Range header '{}'", header)))?;

        let bound = |i: usize| -> Result<Option<u64>> {
            match caps.get(i).map(|m| m.as_str()).filter(|s| !s.is_empty()) {
                Some(digits) => digits
                    .parse()
                    .map(Some)
                    .map_err(|_| Error::validation(format!("invalid Range header '{}'", header))),
                None => Ok(None),
            }
        };

        Ok(Self {
            start: bound(1)?,
            end: bound(2)?,
        })
    }

    /// Resolve against the object size
    ///
    /// `start` defaults to 0 and `end` to the last byte; an `end` past the
    /// last byte is clamped to it.
    pub fn resolve(&self, size: u64) -> RangeResolution {
        let Some(last) = size.checked_sub(1) else {
            return RangeResolution::Unsatisfiable;
        };
        let start = self.start.unwrap_or(0);
        let end = self.end.unwrap_or(last).min(last);

        if start > end || start >= size {
            RangeResolution::Unsatisfiable
        } else {
            RangeResolution::Satisfiable(ByteRange::new(start, end))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn resolve(header: &str, size: u64) -> RangeResolution {
        RangeRequest::parse(header).unwrap().resolve(size)
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            RangeRequest::parse("bytes=0-0").unwrap(),
            RangeRequest { start: Some(0), end: Some(0) }
        );
        assert_eq!(
            RangeRequest::parse("bytes = 5 - ").unwrap(),
            RangeRequest { start: Some(5), end: None }
        );
        assert_eq!(
            RangeRequest::parse("bytes=-").unwrap(),
            RangeRequest { start: None, end: None }
        );
    }

    #[test]
    fn test_malformed() {
        for header in ["items=0-1", "bytes=a-b", "bytes=0-1,3-4", "bytes 0-1", "bytes=99999999999999999999-"] {
            assert!(
                matches!(RangeRequest::parse(header), Err(Error::Validation(_))),
                "{header:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_resolution() {
        assert_eq!(resolve("bytes=0-0", 10), RangeResolution::Satisfiable(ByteRange::new(0, 0)));
        assert_eq!(resolve("bytes=20-30", 10), RangeResolution::Unsatisfiable);
        assert_eq!(resolve("bytes=5-2", 10), RangeResolution::Unsatisfiable);
        assert_eq!(resolve("bytes=4-", 10), RangeResolution::Satisfiable(ByteRange::new(4, 9)));
        assert_eq!(resolve("bytes=-3", 10), RangeResolution::Satisfiable(ByteRange::new(0, 3)));
        assert_eq!(resolve("bytes=-", 10), RangeResolution::Satisfiable(ByteRange::new(0, 9)));
        assert_eq!(resolve("bytes=8-100", 10), RangeResolution::Satisfiable(ByteRange::new(8, 9)));
        assert_eq!(resolve("bytes=0-", 0), RangeResolution::Unsatisfiable);
    }

    proptest! {
        #[test]
        fn prop_satisfiable_ranges_fit_object(start in 0u64..2000, end in 0u64..2000, size in 0u64..1000) {
            let request = RangeRequest { start: Some(start), end: Some(end) };
            match request.resolve(size) {
                RangeResolution::Satisfiable(range) => {
                    prop_assert!(range.start <= range.end);
                    prop_assert!(range.end < size);
                    prop_assert_eq!(range.start, start);
                }
                RangeResolution::Unsatisfiable => {
                    prop_assert!(start > end.min(size.saturating_sub(1)) || start >= size);
                }
            }
        }
    }
}
