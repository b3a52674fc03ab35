#![forbid(unsafe_code)]

//! Splice index resolution shared by every consumer of splice events.
//!
//! A splice carries a raw `start` that may be negative (counted from the end)
//! and an optional delete count (absent means "to the end"). The sequence, the
//! filter and the reconciler all resolve it against the length the sequence
//! had when the splice executed, so they must agree bit for bit.

use std::ops::Range;

/// Resolved, in-bounds range of a splice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpliceRange {
    pub start: usize,
    pub end: usize,
}

impl SpliceRange {
    /// Resolve a raw splice against a sequence of length `len`.
    ///
    /// Out-of-range values are clamped: `start` to `0..=len`, `end` to
    /// `start..=len`.
    #[must_use]
    pub fn resolve(len: usize, start: isize, delete_count: Option<usize>) -> Self {
        let start = Self::resolve_start(len, start);
        let end = match delete_count {
            Some(count) => start.saturating_add(count).min(len),
            None => len,
        };
        Self { start, end }
    }

    /// Resolve only the start index: negative values count from the end.
    #[must_use]
    pub fn resolve_start(len: usize, start: isize) -> usize {
        if start < 0 {
            len.saturating_sub(start.unsigned_abs())
        } else {
            start.unsigned_abs().min(len)
        }
    }

    /// Number of removed elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Raw splice start addressing the in-bounds `index`.
pub(crate) fn raw_start(index: usize) -> isize {
    isize::try_from(index).unwrap_or(isize::MAX)
}

impl From<SpliceRange> for Range<usize> {
    fn from(range: SpliceRange) -> Self {
        range.as_range()
    }
}
