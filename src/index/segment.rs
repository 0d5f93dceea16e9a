//! Fixed-capacity blocks of spans.
//!
//! A segment stores up to [`SEGMENT_CAPACITY`] spans as three index-aligned
//! packed columns (`starts`, `lengths`, `pool_indices`) plus whatever side
//! columns the owning table's codec adds.
//!
//! Optimizing a segment rewrites `starts` as delta codes (see
//! [`DeltaCursor`]) and compresses every column. When a span starts inside
//! its predecessor, or the codes would need a wider column than the
//! absolute starts, the starts are left absolute and `starts_expanded` is
//! recorded instead. Round-trips are exact either way.
//!
//! [`SEGMENT_CAPACITY`]: crate::index::types::SEGMENT_CAPACITY

use crate::error::Result;
use crate::index::column::PackedColumn;
use crate::index::types::{CodecContext, Extent};
use crate::utils::DeltaCursor;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Per-segment columns contributed by a table specialization
pub trait SideColumns: Clone + Debug + Serialize + DeserializeOwned + Send {
    fn optimize(&mut self, ctx: &mut CodecContext) -> Result<()>;
    fn expand(&mut self, ctx: &mut CodecContext) -> Result<()>;
    /// Bytes currently held
    fn stored_len(&self) -> usize;
    /// Bytes held once expanded
    fn raw_len(&self) -> usize;

    /// Whether the columns can serve a segment of `len` spans. Columns of
    /// a segment that is not `optimized` must be readable as they are.
    fn is_consistent(&self, _len: usize, _optimized: bool) -> bool {
        true
    }
}

impl SideColumns for () {
    fn optimize(&mut self, _ctx: &mut CodecContext) -> Result<()> {
        Ok(())
    }

    fn expand(&mut self, _ctx: &mut CodecContext) -> Result<()> {
        Ok(())
    }

    fn stored_len(&self) -> usize {
        0
    }

    fn raw_len(&self) -> usize {
        0
    }
}

/// The span columns every segment carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCore {
    optimized: bool,
    /// Smallest stored start; also the base of the delta codes
    start: u32,
    /// Distance from `start` to the furthest span end
    full_length: u32,
    /// Longest span in the segment
    max_length: u32,
    /// Starts stayed absolute during the last optimization
    starts_expanded: bool,
    starts: PackedColumn,
    lengths: PackedColumn,
    pool_indices: PackedColumn,
}

impl SegmentCore {
    /// Build from stored extents and the pool index of each span's tag
    pub fn build(extents: &[Extent], pool_indices: &[u32]) -> Self {
        debug_assert_eq!(extents.len(), pool_indices.len());

        let start = extents.iter().map(|e| e.start).min().unwrap_or(0);
        let max_end = extents.iter().map(|e| e.end()).max().unwrap_or(start);
        let max_length = extents.iter().map(|e| e.length).max().unwrap_or(0);

        let starts: Vec<u32> = extents.iter().map(|e| e.start).collect();
        let lengths: Vec<u32> = extents.iter().map(|e| e.length).collect();

        Self {
            optimized: false,
            start,
            full_length: max_end - start,
            max_length,
            starts_expanded: true,
            starts: PackedColumn::from_values(&starts),
            lengths: PackedColumn::from_values(&lengths),
            pool_indices: PackedColumn::from_values(pool_indices),
        }
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn is_optimized(&self) -> bool {
        self.optimized
    }

    pub fn starts_expanded(&self) -> bool {
        self.starts_expanded
    }

    /// Range covered by the segment's spans
    pub fn bounds(&self) -> Extent {
        Extent::new(self.start, self.full_length)
    }

    pub fn max_length(&self) -> u32 {
        self.max_length
    }

    /// Stored extent of the span at `offset`. The segment must be expanded.
    #[inline]
    pub fn extent(&self, offset: usize) -> Extent {
        Extent::new(self.starts.get(offset), self.lengths.get(offset))
    }

    #[inline]
    pub fn pool_index(&self, offset: usize) -> u32 {
        self.pool_indices.get(offset)
    }

    /// Whether every column is ready for random access
    pub fn is_consistent(&self) -> bool {
        let n = self.lengths.len();
        let aligned = self.starts.len() == n && self.pool_indices.len() == n;
        let readable = self.optimized
            || (self.starts.is_expanded()
                && self.lengths.is_expanded()
                && self.pool_indices.is_expanded());
        aligned && readable
    }

    pub fn stored_len(&self) -> usize {
        self.starts.stored_len() + self.lengths.stored_len() + self.pool_indices.stored_len()
    }

    pub fn raw_len(&self) -> usize {
        self.starts.raw_len() + self.lengths.raw_len() + self.pool_indices.raw_len()
    }

    pub fn optimize(&mut self, ctx: &mut CodecContext) -> Result<()> {
        if self.optimized {
            return Ok(());
        }
        assert!(
            self.lengths.is_expanded(),
            "segment lengths must be expanded before starts are delta encoded"
        );

        self.starts_expanded = !self.encode_starts();
        if self.starts_expanded {
            ctx.stats.start_fallbacks += 1;
            tracing::debug!(
                start = self.start,
                spans = self.len(),
                "segment starts kept absolute"
            );
        }

        self.starts.optimize(ctx)?;
        self.lengths.optimize(ctx)?;
        self.pool_indices.optimize(ctx)?;

        self.optimized = true;
        ctx.stats.segments_optimized += 1;
        Ok(())
    }

    pub fn expand(&mut self, ctx: &mut CodecContext) -> Result<()> {
        if !self.optimized {
            return Ok(());
        }

        self.starts.expand(ctx)?;
        self.lengths.expand(ctx)?;
        self.pool_indices.expand(ctx)?;

        if !self.starts_expanded {
            self.decode_starts();
        }

        self.optimized = false;
        ctx.stats.segments_expanded += 1;
        Ok(())
    }

    /// Replace absolute starts with delta codes. Returns false (leaving the
    /// starts untouched) when the segment cannot be coded without growing.
    fn encode_starts(&mut self) -> bool {
        let mut cursor = DeltaCursor::new(self.start);
        let mut codes = Vec::with_capacity(self.len());

        for i in 0..self.len() {
            match cursor.encode(self.starts.get(i), self.lengths.get(i)) {
                Some(code) => codes.push(code),
                None => return false,
            }
        }

        let encoded = PackedColumn::from_values(&codes);
        if encoded.byte_width() > self.starts.byte_width() {
            return false;
        }

        self.starts = encoded;
        true
    }

    fn decode_starts(&mut self) {
        let mut cursor = DeltaCursor::new(self.start);
        let starts: Vec<u32> = (0..self.len())
            .map(|i| cursor.decode(self.starts.get(i), self.lengths.get(i)))
            .collect();

        self.starts = PackedColumn::from_values(&starts);
        self.starts_expanded = true;
    }
}

/// A segment: core span columns plus specialization side columns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Segment<X: SideColumns> {
    pub core: SegmentCore,
    pub side: X,
}

impl<X: SideColumns> Segment<X> {
    pub fn new(core: SegmentCore, side: X) -> Self {
        Self { core, side }
    }

    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    pub fn is_optimized(&self) -> bool {
        self.core.is_optimized()
    }

    pub fn stored_len(&self) -> usize {
        self.core.stored_len() + self.side.stored_len()
    }

    pub fn raw_len(&self) -> usize {
        self.core.raw_len() + self.side.raw_len()
    }

    pub fn optimize(&mut self, ctx: &mut CodecContext) -> Result<()> {
        if self.core.is_optimized() {
            return Ok(());
        }
        self.side.optimize(ctx)?;
        self.core.optimize(ctx)
    }

    pub fn expand(&mut self, ctx: &mut CodecContext) -> Result<()> {
        if !self.core.is_optimized() {
            return Ok(());
        }
        self.side.expand(ctx)?;
        self.core.expand(ctx)
    }
}
