//! Generic span table.
//!
//! A [`SpanTable`] is built once from a document's span list. Each span's
//! tag is deduplicated into a value pool by its key, and the spans are cut
//! into segments of [`SEGMENT_CAPACITY`]. Specializations plug in through
//! [`SpanCodec`], which maps their span type onto extents, pooled tags and
//! per-segment side columns, and rebuilds spans on the way out.
//!
//! Reads through `&mut self` ([`SpanTable::get`], [`SpanTable::get_range`])
//! expand optimized segments on first touch. Once [`SpanTable::expand`] or
//! [`SpanTable::expand_parallel`] has run, the `&self` readers can be used
//! from any number of threads.

use crate::error::{CodecError, Result};
use crate::index::segment::{Segment, SegmentCore, SideColumns};
use crate::index::types::{CodecContext, Extent, SEGMENT_CAPACITY};
use ahash::AHashMap;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Range;

/// Hooks a table specialization provides to the generic engine
pub trait SpanCodec: Clone + Debug + Serialize + DeserializeOwned + Send + Sync {
    type Span: Clone + Debug;
    /// Value stored once per distinct key
    type Tag: Clone + Debug + Serialize + DeserializeOwned + Send + Sync;
    /// Identity used to deduplicate tags
    type TagKey: Eq + Hash;
    type Side: SideColumns;

    /// Document range of a span as handed to `build`
    fn extent(&self, span: &Self::Span) -> Extent;

    fn shared_key(&self, span: &Self::Span) -> Self::TagKey;

    fn shared(&self, span: &Self::Span) -> Self::Tag;

    /// Start recorded in the segment for `span`, given its pooled tag
    fn start_for(&self, span: &Self::Span, _shared: &Self::Tag) -> u32 {
        self.extent(span).start
    }

    /// Whether the pool is reordered with [`SpanCodec::compare_shared`]
    fn sorts_pool(&self) -> bool {
        false
    }

    fn compare_shared(&self, _a: &Self::Tag, _b: &Self::Tag) -> Ordering {
        Ordering::Equal
    }

    /// Called once with the final pool, before segments are built
    fn finish_pool(&mut self, _pool: &[Self::Tag]) {}

    /// Whether state kept by `finish_pool` still fits a loaded pool
    fn is_consistent(&self, _pool: &[Self::Tag]) -> bool {
        true
    }

    /// Side columns for one segment's worth of spans
    fn create_segment(&self, spans: &[Self::Span]) -> Self::Side;

    /// Rebuild the span at `offset` of a segment
    fn create_span(
        &self,
        extent: Extent,
        shared: &Self::Tag,
        pool_index: u32,
        side: &Self::Side,
        offset: usize,
    ) -> Self::Span;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct SpanTable<C: SpanCodec> {
    codec: C,
    value_pool: Vec<C::Tag>,
    segments: Vec<Segment<C::Side>>,
    count: usize,
    /// Stored starts never decrease across the table
    sorted: bool,
    max_span_length: u32,
    #[serde(skip)]
    context: CodecContext,
}

impl<C: SpanCodec> SpanTable<C> {
    /// Build a table from a finalized span list
    pub fn build(mut codec: C, spans: &[C::Span]) -> Self {
        let mut keys: AHashMap<C::TagKey, u32> = AHashMap::new();
        let mut pool: Vec<C::Tag> = Vec::new();
        let mut indices: Vec<u32> = Vec::with_capacity(spans.len());

        for span in spans {
            let key = codec.shared_key(span);
            let index = *keys.entry(key).or_insert_with(|| {
                pool.push(codec.shared(span));
                (pool.len() - 1) as u32
            });
            indices.push(index);
        }

        if codec.sorts_pool() {
            let mut order: Vec<usize> = (0..pool.len()).collect();
            order.sort_by(|&a, &b| codec.compare_shared(&pool[a], &pool[b]));

            let mut remap = vec![0u32; pool.len()];
            for (new_index, &old_index) in order.iter().enumerate() {
                remap[old_index] = new_index as u32;
            }
            pool = order.iter().map(|&old_index| pool[old_index].clone()).collect();
            for index in &mut indices {
                *index = remap[*index as usize];
            }
        }
        codec.finish_pool(&pool);

        let extents: Vec<Extent> = spans
            .iter()
            .zip(&indices)
            .map(|(span, &index)| {
                let start = codec.start_for(span, &pool[index as usize]);
                Extent::new(start, codec.extent(span).length)
            })
            .collect();
        let sorted = extents.windows(2).all(|w| w[0].start <= w[1].start);
        let max_span_length = extents.iter().map(|e| e.length).max().unwrap_or(0);

        let segments = spans
            .chunks(SEGMENT_CAPACITY)
            .zip(extents.chunks(SEGMENT_CAPACITY))
            .zip(indices.chunks(SEGMENT_CAPACITY))
            .map(|((chunk, extents), indices)| {
                Segment::new(SegmentCore::build(extents, indices), codec.create_segment(chunk))
            })
            .collect();

        Self {
            codec,
            value_pool: pool,
            segments,
            count: spans.len(),
            sorted,
            max_span_length,
            context: CodecContext::default(),
        }
    }

    /// Use a different zstd level for later optimize/expand calls
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.context = CodecContext::new(level);
        self
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn value_pool(&self) -> &[C::Tag] {
        &self.value_pool
    }

    pub fn segments(&self) -> &[Segment<C::Side>] {
        &self.segments
    }

    pub fn context(&self) -> &CodecContext {
        &self.context
    }

    /// Whether the input was sorted by stored start
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn is_optimized(&self) -> bool {
        !self.segments.is_empty() && self.segments.iter().all(|s| s.is_optimized())
    }

    /// Stored bytes across every segment's columns
    pub fn estimated_size(&self) -> usize {
        self.segments.iter().map(|s| s.stored_len()).sum()
    }

    /// Bytes the segment columns take once expanded
    pub fn raw_size(&self) -> usize {
        self.segments.iter().map(|s| s.raw_len()).sum()
    }

    /// Optimize every segment with the table's own context
    pub fn optimize(&mut self) -> Result<()> {
        let Self {
            segments, context, ..
        } = self;
        segments.iter_mut().try_for_each(|s| s.optimize(context))
    }

    /// Optimize every segment with a caller-supplied context
    pub fn optimize_with(&mut self, ctx: &mut CodecContext) -> Result<()> {
        self.segments.iter_mut().try_for_each(|s| s.optimize(ctx))
    }

    /// Expand every segment on the calling thread
    pub fn expand(&mut self) -> Result<()> {
        let Self {
            segments, context, ..
        } = self;
        segments.iter_mut().try_for_each(|s| s.expand(context))
    }

    /// Expand every segment so the `&self` readers can be shared
    pub fn expand_all(&mut self, parallel: bool) -> Result<()> {
        if parallel {
            self.expand_parallel()
        } else {
            self.expand()
        }
    }

    /// Expand every segment on the rayon pool
    pub fn expand_parallel(&mut self) -> Result<()> {
        let level = self.context.level();
        let pending = self.segments.iter().filter(|s| s.is_optimized()).count();

        self.segments
            .par_iter_mut()
            .try_for_each_init(|| CodecContext::new(level), |ctx, segment| segment.expand(ctx))?;

        self.context.stats.segments_expanded += pending as u64;
        Ok(())
    }

    /// Span at `index`, expanding its segment if needed
    pub fn get(&mut self, index: usize) -> Result<C::Span> {
        let (segment, _) = self.locate(index)?;
        self.segments[segment].expand(&mut self.context)?;
        self.span_at(index)
    }

    /// Span at `index` from an already expanded segment
    pub fn span_at(&self, index: usize) -> Result<C::Span> {
        let (segment_index, offset) = self.locate(index)?;
        let segment = self.expanded_segment(segment_index)?;
        self.decode(segment, offset)
    }

    /// Spans overlapping `[start, start + length)` in table order,
    /// expanding the segments the query touches.
    ///
    /// See [`Extent::overlaps`] for how empty spans and queries match.
    pub fn get_range(&mut self, start: u32, length: u32) -> Result<Vec<C::Span>> {
        let spans = self.get_range_indexed(start, length)?;
        Ok(spans.into_iter().map(|(_, span)| span).collect())
    }

    /// Like [`SpanTable::get_range`], paired with each span's table index
    pub fn get_range_indexed(&mut self, start: u32, length: u32) -> Result<Vec<(usize, C::Span)>> {
        let query = Extent::new(start, length);
        for segment_index in self.candidate_segments(&query) {
            self.segments[segment_index].expand(&mut self.context)?;
        }
        self.spans_in_range_indexed(start, length)
    }

    /// Same as [`SpanTable::get_range`] for already expanded segments
    pub fn spans_in_range(&self, start: u32, length: u32) -> Result<Vec<C::Span>> {
        let spans = self.spans_in_range_indexed(start, length)?;
        Ok(spans.into_iter().map(|(_, span)| span).collect())
    }

    pub fn spans_in_range_indexed(&self, start: u32, length: u32) -> Result<Vec<(usize, C::Span)>> {
        let query = Extent::new(start, length);
        let mut spans = Vec::new();

        for segment_index in self.candidate_segments(&query) {
            let segment = self.expanded_segment(segment_index)?;
            for offset in self.offset_window(&segment.core, &query) {
                if segment.core.extent(offset).overlaps(&query) {
                    let index = segment_index * SEGMENT_CAPACITY + offset;
                    spans.push((index, self.decode(segment, offset)?));
                }
            }
        }
        Ok(spans)
    }

    /// Iterate every span; all segments must be expanded
    pub fn iter(&self) -> impl Iterator<Item = Result<C::Span>> + '_ {
        (0..self.count).map(move |i| self.span_at(i))
    }

    /// Expand everything and decode all spans in order
    pub fn to_vec(&mut self) -> Result<Vec<C::Span>> {
        self.expand()?;
        self.iter().collect()
    }

    /// Structural checks for tables loaded from storage
    pub fn validate(&self) -> Result<()> {
        let mut total = 0;
        for (i, segment) in self.segments.iter().enumerate() {
            let side_ok = segment.side.is_consistent(segment.len(), segment.is_optimized());
            if !segment.core.is_consistent() || !side_ok {
                return Err(CodecError::Corrupt(format!(
                    "segment {i} columns are misaligned or unreadable"
                )));
            }
            let is_last = i + 1 == self.segments.len();
            if segment.len() > SEGMENT_CAPACITY
                || (!is_last && segment.len() != SEGMENT_CAPACITY)
                || segment.is_empty()
            {
                return Err(CodecError::Corrupt(format!(
                    "segment {i} holds {} spans",
                    segment.len()
                )));
            }
            total += segment.len();
        }

        if total != self.count {
            return Err(CodecError::Corrupt(format!(
                "segments hold {total} spans, table records {}",
                self.count
            )));
        }
        if self.value_pool.len() > self.count {
            return Err(CodecError::Corrupt(format!(
                "value pool of {} exceeds {} spans",
                self.value_pool.len(),
                self.count
            )));
        }
        if !self.codec.is_consistent(&self.value_pool) {
            return Err(CodecError::Corrupt(
                "codec state does not match the value pool".to_string(),
            ));
        }
        Ok(())
    }

    fn locate(&self, index: usize) -> Result<(usize, usize)> {
        if index >= self.count {
            return Err(CodecError::IndexOutOfRange {
                index,
                count: self.count,
            });
        }
        Ok((index / SEGMENT_CAPACITY, index % SEGMENT_CAPACITY))
    }

    fn expanded_segment(&self, index: usize) -> Result<&Segment<C::Side>> {
        let segment = &self.segments[index];
        if segment.is_optimized() {
            return Err(CodecError::SegmentOptimized(index));
        }
        Ok(segment)
    }

    fn decode(&self, segment: &Segment<C::Side>, offset: usize) -> Result<C::Span> {
        let pool_index = segment.core.pool_index(offset);
        let shared = self.value_pool.get(pool_index as usize).ok_or_else(|| {
            CodecError::Corrupt(format!(
                "pool index {pool_index} outside pool of {}",
                self.value_pool.len()
            ))
        })?;

        Ok(self.codec.create_span(
            segment.core.extent(offset),
            shared,
            pool_index,
            &segment.side,
            offset,
        ))
    }

    /// Segments whose bounds may hold spans overlapping `query`
    fn candidate_segments(&self, query: &Extent) -> Vec<usize> {
        let window = if self.sorted {
            // Spans starting before `threshold` end before the query. The
            // last segment starting before it may still hold later spans.
            let threshold = query.start.saturating_sub(self.max_span_length);
            let lo = self
                .segments
                .partition_point(|s| s.core.bounds().start < threshold)
                .saturating_sub(1);
            let hi = self
                .segments
                .partition_point(|s| s.core.bounds().start <= query.end());
            lo..hi.max(lo)
        } else {
            0..self.segments.len()
        };

        window
            .filter(|&i| {
                let bounds = self.segments[i].core.bounds();
                bounds.start <= query.end() && bounds.end() >= query.start
            })
            .collect()
    }

    /// Offsets within an expanded segment that may overlap `query`
    fn offset_window(&self, core: &SegmentCore, query: &Extent) -> Range<usize> {
        if !self.sorted {
            return 0..core.len();
        }

        let threshold = query.start.saturating_sub(core.max_length());
        let lo = partition_point(core.len(), |i| core.extent(i).start < threshold);
        let hi = partition_point(core.len(), |i| core.extent(i).start <= query.end());
        lo..hi.max(lo)
    }
}

/// First index in `0..len` for which `pred` is false, assuming `pred`
/// holds for a prefix of the range
fn partition_point(len: usize, pred: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}
