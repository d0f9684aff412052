//! Page blob alignment.

/// Page blob constants.
pub const PAGE_SIZE: u64 = 512;
pub const MAX_PAGE_BLOB_SIZE: u64 = 8 * 1024 * 1024 * 1024 * 1024; // 8 TiB
pub const MAX_PAGE_RANGE_SIZE: u64 = 4 * 1024 * 1024; // 4 MiB per write operation

/// Rounds `length` up to the next page boundary.
pub fn page_align_content_length(length: u64) -> u64 {
    let rem = length % PAGE_SIZE;
    if rem == 0 {
        length
    } else {
        length + (PAGE_SIZE - rem)
    }
}

/// Whether `offset` falls on a page boundary.
pub fn is_page_aligned(offset: u64) -> bool {
    offset % PAGE_SIZE == 0
}

/// A half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `bytes=start-last` with an inclusive last byte, as used in `x-ms-range`
    /// and `x-ms-source-range` headers. `None` for empty ranges.
    pub fn to_header(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(format!("bytes={}-{}", self.start, self.end - 1))
    }

    /// Parses `bytes=start-last`.
    pub fn from_header(value: &str) -> Option<Self> {
        let value = value.strip_prefix("bytes=")?;
        let (start, last) = value.split_once('-')?;
        let start: u64 = start.parse().ok()?;
        let last: u64 = last.parse().ok()?;
        if last < start {
            return None;
        }
        Some(Self::new(start, last + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_align() {
        assert_eq!(page_align_content_length(0), 0);
        assert_eq!(page_align_content_length(1), 512);
        assert_eq!(page_align_content_length(512), 512);
        assert_eq!(page_align_content_length(513), 1024);
        assert_eq!(page_align_content_length(1000), 1024);
    }

    #[test]
    fn test_range_header() {
        let range = ByteRange::new(0, 512);
        assert_eq!(range.len(), 512);
        assert_eq!(range.to_header().as_deref(), Some("bytes=0-511"));
        assert_eq!(ByteRange::from_header("bytes=0-511"), Some(range));
        assert_eq!(ByteRange::new(10, 10).to_header(), None);
        assert_eq!(ByteRange::from_header("bytes=9-3"), None);
    }
}
