//! Symbol reference spans, optionally carrying line context.

use crate::error::Result;
use crate::index::column::PackedColumn;
use crate::index::segment::SideColumns;
use crate::index::table::{SpanCodec, SpanTable};
use crate::index::types::{CodecContext, Extent};
use crate::tables::line_context::{LineContextMode, LineContextTable, LineMap, LineSpan};
use crate::utils::BitVector;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    #[default]
    Reference,
    Definition,
    Declaration,
    Implementation,
    Write,
}

/// The pooled symbol a reference points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSymbol {
    pub project_id: String,
    pub symbol_id: String,
    pub kind: ReferenceKind,
    /// Extra display data; does not take part in deduplication
    #[serde(default)]
    pub display_name: String,
}

impl ReferenceSymbol {
    pub fn key(&self) -> SymbolKey {
        (self.project_id.clone(), self.symbol_id.clone(), self.kind)
    }
}

pub type SymbolKey = (String, String, ReferenceKind);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSpan {
    pub start: u32,
    pub length: u32,
    pub symbol: ReferenceSymbol,
    #[serde(default)]
    pub exclude_from_search: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_definition: Option<String>,
}

/// Per-segment side data of a reference table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceColumns {
    /// Only present when some span in the segment is excluded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_from_search: Option<BitVector>,
    /// Slot 0 is the absent definition
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_pool: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_indices: Option<PackedColumn>,
}

impl ReferenceColumns {
    fn build(spans: &[ReferenceSpan]) -> Self {
        let exclude_from_search = BitVector::from_flags(spans.iter().map(|s| s.exclude_from_search));

        let mut related_pool = vec![String::new()];
        let mut slots: AHashMap<&str, u32> = AHashMap::new();
        let indices: Vec<u32> = spans
            .iter()
            .map(|span| match span.related_definition.as_deref() {
                None | Some("") => 0,
                Some(definition) => *slots.entry(definition).or_insert_with(|| {
                    related_pool.push(definition.to_string());
                    (related_pool.len() - 1) as u32
                }),
            })
            .collect();

        let related_indices = PackedColumn::from_values_or_none(&indices);
        if related_indices.is_none() {
            related_pool.clear();
        }

        Self {
            exclude_from_search,
            related_pool,
            related_indices,
        }
    }

    fn related_definition(&self, offset: usize) -> Option<String> {
        let slot = self.related_indices.as_ref()?.get(offset) as usize;
        if slot == 0 {
            return None;
        }
        self.related_pool.get(slot).cloned()
    }

    fn is_excluded(&self, offset: usize) -> bool {
        self.exclude_from_search
            .as_ref()
            .is_some_and(|bits| bits.get(offset))
    }

    fn pool_len(&self) -> usize {
        self.related_pool.iter().map(|s| s.len()).sum()
    }

    fn bits_len(&self) -> usize {
        self.exclude_from_search.as_ref().map_or(0, |b| b.byte_len())
    }
}

impl SideColumns for ReferenceColumns {
    fn optimize(&mut self, ctx: &mut CodecContext) -> Result<()> {
        match &mut self.related_indices {
            Some(column) => column.optimize(ctx),
            None => Ok(()),
        }
    }

    fn expand(&mut self, ctx: &mut CodecContext) -> Result<()> {
        match &mut self.related_indices {
            Some(column) => column.expand(ctx),
            None => Ok(()),
        }
    }

    fn stored_len(&self) -> usize {
        self.bits_len()
            + self.pool_len()
            + self.related_indices.as_ref().map_or(0, |c| c.stored_len())
    }

    fn raw_len(&self) -> usize {
        self.bits_len() + self.pool_len() + self.related_indices.as_ref().map_or(0, |c| c.raw_len())
    }

    fn is_consistent(&self, len: usize, optimized: bool) -> bool {
        let bits_ok = self.exclude_from_search.as_ref().is_none_or(|b| b.len() == len);
        let indices_ok = self
            .related_indices
            .as_ref()
            .is_none_or(|c| c.len() == len && (optimized || c.is_expanded()));
        bits_ok && indices_ok
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReferenceCodec;

impl SpanCodec for ReferenceCodec {
    type Span = ReferenceSpan;
    type Tag = ReferenceSymbol;
    type TagKey = SymbolKey;
    type Side = ReferenceColumns;

    fn extent(&self, span: &ReferenceSpan) -> Extent {
        Extent::new(span.start, span.length)
    }

    fn shared_key(&self, span: &ReferenceSpan) -> SymbolKey {
        span.symbol.key()
    }

    fn shared(&self, span: &ReferenceSpan) -> ReferenceSymbol {
        span.symbol.clone()
    }

    fn create_segment(&self, spans: &[ReferenceSpan]) -> ReferenceColumns {
        ReferenceColumns::build(spans)
    }

    fn create_span(
        &self,
        extent: Extent,
        shared: &ReferenceSymbol,
        _pool_index: u32,
        side: &ReferenceColumns,
        offset: usize,
    ) -> ReferenceSpan {
        ReferenceSpan {
            start: extent.start,
            length: extent.length,
            symbol: shared.clone(),
            exclude_from_search: side.is_excluded(offset),
            related_definition: side.related_definition(offset),
        }
    }
}

/// Reference spans of one document plus the optional line context that
/// travels with them. Line span `i` belongs to reference `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceTable {
    pub references: SpanTable<ReferenceCodec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_context: Option<LineContextTable>,
}

impl ReferenceTable {
    pub fn build(spans: &[ReferenceSpan]) -> Self {
        Self {
            references: SpanTable::build(ReferenceCodec, spans),
            line_context: None,
        }
    }

    /// Build with line context taken from the document text
    pub fn with_source(
        spans: &[ReferenceSpan],
        source: &str,
        mode: LineContextMode,
        include_span_ranges: bool,
    ) -> Self {
        let lines = LineMap::new(source)
            .line_spans(spans.iter().map(|s| Extent::new(s.start, s.length)));
        Self::build(spans).with_line_context(LineContextTable::from_lines(
            mode,
            include_span_ranges,
            &lines,
        ))
    }

    pub fn with_line_context(mut self, table: LineContextTable) -> Self {
        debug_assert_eq!(table.len(), self.references.len());
        self.line_context = Some(table);
        self
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn get(&mut self, index: usize) -> Result<ReferenceSpan> {
        self.references.get(index)
    }

    pub fn get_range(&mut self, start: u32, length: u32) -> Result<Vec<ReferenceSpan>> {
        self.references.get_range(start, length)
    }

    pub fn get_range_indexed(
        &mut self,
        start: u32,
        length: u32,
    ) -> Result<Vec<(usize, ReferenceSpan)>> {
        self.references.get_range_indexed(start, length)
    }

    /// Line context of reference `index`, if the table carries any
    pub fn line(&mut self, index: usize) -> Result<Option<LineSpan>> {
        match &mut self.line_context {
            Some(lines) => lines.get(index).map(Some),
            None => Ok(None),
        }
    }

    /// Use a different zstd level for both tables
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.references = self.references.with_compression_level(level);
        self.line_context = self
            .line_context
            .map(|lines| lines.with_compression_level(level));
        self
    }

    /// Optimize both tables, each with its own context
    pub fn optimize(&mut self) -> Result<()> {
        self.references.optimize()?;
        if let Some(lines) = &mut self.line_context {
            lines.optimize()?;
        }
        Ok(())
    }

    pub fn optimize_with(&mut self, ctx: &mut CodecContext) -> Result<()> {
        self.references.optimize_with(ctx)?;
        if let Some(lines) = &mut self.line_context {
            lines.optimize_with(ctx)?;
        }
        Ok(())
    }

    pub fn expand_all(&mut self, parallel: bool) -> Result<()> {
        self.references.expand_all(parallel)?;
        if let Some(lines) = &mut self.line_context {
            lines.expand_all(parallel)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.references.validate()?;
        if let Some(lines) = &self.line_context {
            lines.validate()?;
            if lines.len() != self.references.len() {
                return Err(crate::error::CodecError::Corrupt(format!(
                    "line context holds {} spans for {} references",
                    lines.len(),
                    self.references.len()
                )));
            }
        }
        Ok(())
    }

    pub fn estimated_size(&self) -> usize {
        self.references.estimated_size()
            + self.line_context.as_ref().map_or(0, |l| l.estimated_size())
    }
}
