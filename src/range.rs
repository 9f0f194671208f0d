//! Byte-range value types.

use std::fmt::Display;

use crate::MAX_LENGTH;
use crate::error::FrameError;

/// Half-open byte range with the canonical wire form `bytes=START-END`.
///
/// The wire form carries an inclusive END; in memory `stop` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    start: u64,
    stop: u64,
}

impl Range {
    pub fn new(start: u64, stop: u64) -> Result<Self, FrameError> {
        if start >= stop || stop > MAX_LENGTH {
            return Err(FrameError::RangeValues { start, stop });
        }

        Ok(Self { start, stop })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn stop(&self) -> u64 {
        self.stop
    }
}

impl Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.stop - 1)
    }
}

/// Range-with-total, the canonical wire form `bytes START-END/TOTAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentRange {
    start: u64,
    stop: u64,
    total: u64,
}

impl ContentRange {
    pub fn new(start: u64, stop: u64, total: u64) -> Result<Self, FrameError> {
        if start >= stop || stop > total || total > MAX_LENGTH {
            return Err(FrameError::ContentRangeValues { start, stop, total });
        }

        Ok(Self { start, stop, total })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn stop(&self) -> u64 {
        self.stop
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

impl Display for ContentRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bytes {}-{}/{}", self.start, self.stop - 1, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_canonical_form() {
        assert_eq!(Range::new(0, 1).unwrap().to_string(), "bytes=0-0");
        assert_eq!(Range::new(10, 20).unwrap().to_string(), "bytes=10-19");
        assert_eq!(
            Range::new(0, MAX_LENGTH).unwrap().to_string(),
            "bytes=0-9999999999999998"
        );
    }

    #[test]
    fn test_range_invariants() {
        assert_eq!(
            Range::new(5, 5).unwrap_err().to_string(),
            "need 0 <= start < stop <= 9999999999999999; got (5, 5)"
        );
        assert!(Range::new(6, 5).is_err());
        assert!(Range::new(0, MAX_LENGTH + 1).is_err());
    }

    #[test]
    fn test_content_range_canonical_form() {
        let cr = ContentRange::new(10, 20, 100).unwrap();
        assert_eq!(cr.to_string(), "bytes 10-19/100");
        assert_eq!(cr.start(), 10);
        assert_eq!(cr.stop(), 20);
        assert_eq!(cr.total(), 100);
    }

    #[test]
    fn test_content_range_invariants() {
        assert!(ContentRange::new(10, 20, 19).is_err());
        assert!(ContentRange::new(20, 20, 100).is_err());
        assert!(ContentRange::new(0, 1, MAX_LENGTH + 1).is_err());
        assert_eq!(
            ContentRange::new(3, 2, 1).unwrap_err().to_string(),
            "need 0 <= start < stop <= total <= 9999999999999999; got (3, 2, 1)"
        );
    }
}
