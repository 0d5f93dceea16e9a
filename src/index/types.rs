use crate::error::{CodecError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use zstd::bulk::{Compressor, Decompressor};

/// Maximum number of spans held by one segment
pub const SEGMENT_CAPACITY: usize = 4096;

/// zstd level used when none is configured
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Byte range of a span within its document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Extent {
    pub start: u32,
    pub length: u32,
}

impl Extent {
    pub fn new(start: u32, length: u32) -> Self {
        Self { start, length }
    }

    /// Exclusive end offset (saturates at u32::MAX)
    #[inline]
    pub fn end(&self) -> u32 {
        self.start.saturating_add(self.length)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether this span overlaps the query range.
    ///
    /// Empty ranges behave as points: an empty span at `p` matches a query
    /// `[s, e)` when `s <= p < e`, an empty query at `q` matches a span
    /// `[a, b)` when `a <= q < b`, and two empty ranges match when they
    /// sit at the same offset.
    #[inline]
    pub fn overlaps(&self, query: &Extent) -> bool {
        let (start, end) = (self.start, self.end());
        let (q_start, q_end) = (query.start, query.end());

        match (self.is_empty(), query.is_empty()) {
            (false, false) => start < q_end && q_start < end,
            (true, false) => q_start <= start && start < q_end,
            (false, true) => start <= q_start && q_start < end,
            (true, true) => start == q_start,
        }
    }
}

/// Counters collected while optimizing and expanding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CodecStats {
    pub segments_optimized: u64,
    pub segments_expanded: u64,
    /// Segments whose starts stayed absolute during optimization
    pub start_fallbacks: u64,
    pub columns_compressed: u64,
    /// Columns whose compressed form was not smaller than the raw bytes
    pub columns_stored_raw: u64,
}

/// Reusable compression state shared by every column a caller optimizes
/// or expands.
///
/// zstd contexts are created on first use and kept for later calls.
pub struct CodecContext {
    level: i32,
    compressor: Option<Compressor<'static>>,
    decompressor: Option<Decompressor<'static>>,
    pub stats: CodecStats,
}

impl CodecContext {
    pub fn new(level: i32) -> Self {
        Self {
            level,
            compressor: None,
            decompressor: None,
            stats: CodecStats::default(),
        }
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub(crate) fn compress(&mut self, raw: &[u8]) -> Result<Vec<u8>> {
        let mut compressor = match self.compressor.take() {
            Some(compressor) => compressor,
            None => Compressor::new(self.level).map_err(CodecError::Compression)?,
        };
        let compressed = compressor.compress(raw).map_err(CodecError::Compression);
        self.compressor = Some(compressor);
        compressed
    }

    pub(crate) fn decompress(&mut self, data: &[u8], decompressed_len: usize) -> Result<Vec<u8>> {
        let mut decompressor = match self.decompressor.take() {
            Some(decompressor) => decompressor,
            None => Decompressor::new().map_err(CodecError::Decompression)?,
        };
        let raw = decompressor.decompress(data, decompressed_len);
        self.decompressor = Some(decompressor);
        let raw = raw.map_err(CodecError::Decompression)?;

        if raw.len() != decompressed_len {
            return Err(CodecError::Corrupt(format!(
                "decompressed {} bytes, expected {}",
                raw.len(),
                decompressed_len
            )));
        }
        Ok(raw)
    }
}

impl Default for CodecContext {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl Clone for CodecContext {
    fn clone(&self) -> Self {
        Self {
            level: self.level,
            compressor: None,
            decompressor: None,
            stats: self.stats,
        }
    }
}

impl fmt::Debug for CodecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecContext")
            .field("level", &self.level)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_overlap() {
        let span = Extent::new(10, 5);
        assert!(span.overlaps(&Extent::new(12, 1)));
        assert!(span.overlaps(&Extent::new(0, 11)));
        assert!(span.overlaps(&Extent::new(14, 10)));
        assert!(!span.overlaps(&Extent::new(15, 10)));
        assert!(!span.overlaps(&Extent::new(0, 10)));
    }

    #[test]
    fn test_extent_empty_overlap() {
        let empty = Extent::new(8, 0);
        assert!(empty.overlaps(&Extent::new(8, 1)));
        assert!(empty.overlaps(&Extent::new(0, 9)));
        assert!(!empty.overlaps(&Extent::new(0, 8)));
        assert!(empty.overlaps(&Extent::new(8, 0)));
        assert!(!empty.overlaps(&Extent::new(9, 0)));

        // Empty query inside a span
        assert!(Extent::new(5, 3).overlaps(&Extent::new(5, 0)));
        assert!(!Extent::new(5, 3).overlaps(&Extent::new(8, 0)));
    }

    #[test]
    fn test_context_roundtrip() {
        let mut ctx = CodecContext::default();
        let raw = vec![7u8; 4096];
        let compressed = ctx.compress(&raw).unwrap();
        assert!(compressed.len() < raw.len());
        assert_eq!(ctx.decompress(&compressed, raw.len()).unwrap(), raw);
    }

    #[test]
    fn test_context_rejects_garbage() {
        let mut ctx = CodecContext::default();
        assert!(ctx.decompress(b"definitely not zstd", 64).is_err());
    }
}
