//! Line-level text context for reference spans.
//!
//! Each span keeps its length and its column within the line; the line
//! itself (text, start offset, index) is pooled so identical lines are
//! stored once. Two pool layouts exist, see [`LineContextMode`].

use crate::index::column::PackedColumn;
use crate::index::table::{SpanCodec, SpanTable};
use crate::index::types::Extent;
use memchr::memchr_iter;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How shared lines are keyed and ordered in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineContextMode {
    /// Line text is the pool key; identical lines collapse into one entry
    /// and the pool is sorted lexicographically.
    Full,
    /// Line index is the pool key; the pool is sorted by index.
    #[default]
    Ordinal,
}

impl std::str::FromStr for LineContextMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "ordinal" => Ok(Self::Ordinal),
            other => Err(format!("unknown line context mode '{other}'")),
        }
    }
}

/// A source line shared by every span that sits on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedLine {
    /// Zero-based line number; restored from the table's index column
    #[serde(skip)]
    pub line_index: u32,
    /// Byte offset of the line in its document, 0 when ranges are dropped
    pub line_start: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSpan {
    pub start: u32,
    pub length: u32,
    pub line: SharedLine,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineContextCodec {
    mode: LineContextMode,
    include_span_ranges: bool,
    /// Line index of each pool entry, in pool order
    line_indices: Option<PackedColumn>,
}

impl LineContextCodec {
    /// Full mode always drops absolute ranges, since a pooled line may
    /// stand for several lines at different offsets.
    pub fn new(mode: LineContextMode, include_span_ranges: bool) -> Self {
        Self {
            mode,
            include_span_ranges: include_span_ranges && mode == LineContextMode::Ordinal,
            line_indices: None,
        }
    }

    pub fn mode(&self) -> LineContextMode {
        self.mode
    }

    pub fn includes_span_ranges(&self) -> bool {
        self.include_span_ranges
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LineKey {
    Text(String),
    Index(u32),
}

impl SpanCodec for LineContextCodec {
    type Span = LineSpan;
    type Tag = SharedLine;
    type TagKey = LineKey;
    type Side = ();

    fn extent(&self, span: &LineSpan) -> Extent {
        Extent::new(span.start, span.length)
    }

    fn shared_key(&self, span: &LineSpan) -> LineKey {
        match self.mode {
            LineContextMode::Full => LineKey::Text(span.line.text.clone()),
            LineContextMode::Ordinal => LineKey::Index(span.line.line_index),
        }
    }

    fn shared(&self, span: &LineSpan) -> SharedLine {
        let mut line = span.line.clone();
        if !self.include_span_ranges {
            line.line_start = 0;
        }
        line
    }

    /// Column of the span within its own line
    fn start_for(&self, span: &LineSpan, _shared: &SharedLine) -> u32 {
        span.start.saturating_sub(span.line.line_start)
    }

    fn sorts_pool(&self) -> bool {
        true
    }

    fn compare_shared(&self, a: &SharedLine, b: &SharedLine) -> Ordering {
        match self.mode {
            LineContextMode::Full => a.text.cmp(&b.text),
            LineContextMode::Ordinal => a.line_index.cmp(&b.line_index),
        }
    }

    fn finish_pool(&mut self, pool: &[SharedLine]) {
        let indices: Vec<u32> = pool.iter().map(|line| line.line_index).collect();
        self.line_indices = PackedColumn::from_values_or_none(&indices);
    }

    fn is_consistent(&self, pool: &[SharedLine]) -> bool {
        self.line_indices
            .as_ref()
            .is_none_or(|column| column.is_expanded() && column.len() == pool.len())
    }

    fn create_segment(&self, _spans: &[LineSpan]) {}

    fn create_span(
        &self,
        extent: Extent,
        shared: &SharedLine,
        pool_index: u32,
        _side: &(),
        _offset: usize,
    ) -> LineSpan {
        // A missing column means every pooled line is line 0
        let line_index = self
            .line_indices
            .as_ref()
            .map_or(0, |column| column.get(pool_index as usize));

        LineSpan {
            start: extent.start.saturating_add(shared.line_start),
            length: extent.length,
            line: SharedLine {
                line_index,
                line_start: shared.line_start,
                text: shared.text.clone(),
            },
        }
    }
}

pub type LineContextTable = SpanTable<LineContextCodec>;

impl SpanTable<LineContextCodec> {
    pub fn from_lines(mode: LineContextMode, include_span_ranges: bool, spans: &[LineSpan]) -> Self {
        SpanTable::build(LineContextCodec::new(mode, include_span_ranges), spans)
    }
}

/// Line start offsets of a document
#[derive(Debug, Clone)]
pub struct LineMap<'a> {
    source: &'a str,
    offsets: Vec<u32>,
}

impl<'a> LineMap<'a> {
    pub fn new(source: &'a str) -> Self {
        let bytes = source.as_bytes();
        let mut offsets = vec![0u32];
        offsets.extend(
            memchr_iter(b'\n', bytes)
                .filter(|&i| i + 1 < bytes.len())
                .map(|i| (i + 1) as u32),
        );
        Self { source, offsets }
    }

    pub fn line_count(&self) -> usize {
        self.offsets.len()
    }

    /// Zero-based line holding `offset`; offsets past the end map to the last line
    pub fn line_index(&self, offset: u32) -> u32 {
        match self.offsets.binary_search(&offset) {
            Ok(i) => i as u32,
            Err(i) => i.saturating_sub(1) as u32,
        }
    }

    /// The line holding `offset`, without its line terminator
    pub fn line_at(&self, offset: u32) -> SharedLine {
        let line_index = self.line_index(offset);
        let start = self.offsets[line_index as usize] as usize;
        let end = self
            .offsets
            .get(line_index as usize + 1)
            .map_or(self.source.len(), |&next| next as usize);

        let text = self.source[start..end].trim_end_matches(['\n', '\r']);
        SharedLine {
            line_index,
            line_start: start as u32,
            text: text.to_string(),
        }
    }

    /// Pair each `(start, length)` extent with its line
    pub fn line_spans(&self, extents: impl IntoIterator<Item = Extent>) -> Vec<LineSpan> {
        extents
            .into_iter()
            .map(|extent| LineSpan {
                start: extent.start,
                length: extent.length,
                line: self.line_at(extent.start),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    const SOURCE: &str = "fn main() {\n    let x = 1;\n    let x = 1;\n}\n";

    fn spans() -> Vec<LineSpan> {
        let map = LineMap::new(SOURCE);
        // `main`, both `x` and the closing brace
        map.line_spans([
            Extent::new(3, 4),
            Extent::new(20, 1),
            Extent::new(35, 1),
            Extent::new(42, 1),
        ])
    }

    #[test]
    fn test_line_map() {
        let map = LineMap::new(SOURCE);
        assert_eq!(map.line_count(), 4);
        assert_eq!(map.line_index(0), 0);
        assert_eq!(map.line_index(12), 1);
        assert_eq!(map.line_index(11), 0);
        assert_eq!(map.line_index(1000), 3);

        let line = map.line_at(20);
        assert_eq!(line.line_index, 1);
        assert_eq!(line.line_start, 12);
        assert_eq!(line.text, "    let x = 1;");
    }

    #[test]
    fn test_line_map_crlf() {
        let map = LineMap::new("a\r\nb");
        assert_eq!(map.line_at(0).text, "a");
        assert_eq!(map.line_at(3).text, "b");
    }

    #[test]
    fn test_ordinal_mode_with_ranges() {
        let spans = spans();
        let mut table = LineContextTable::from_lines(LineContextMode::Ordinal, true, &spans);

        assert_eq!(table.value_pool().len(), 4);
        table.optimize().unwrap();
        assert_eq!(table.to_vec().unwrap(), spans);
    }

    #[test]
    fn test_ordinal_mode_drops_ranges() {
        let spans = spans();
        let mut table = LineContextTable::from_lines(LineContextMode::Ordinal, false, &spans);
        let decoded = table.to_vec().unwrap();

        for (decoded, original) in decoded.iter().zip(&spans) {
            assert_eq!(decoded.start, original.start - original.line.line_start);
            assert_eq!(decoded.length, original.length);
            assert_eq!(decoded.line.line_start, 0);
            assert_eq!(decoded.line.line_index, original.line.line_index);
            assert_eq!(decoded.line.text, original.line.text);
        }
    }

    #[test]
    fn test_full_mode_dedups_identical_lines() {
        let spans = spans();
        let mut table = LineContextTable::from_lines(LineContextMode::Full, true, &spans);
        assert!(!table.codec().includes_span_ranges());

        // The two `let x = 1;` lines share one entry; pool is sorted by text
        let texts: Vec<&str> = table.value_pool().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["    let x = 1;", "fn main() {", "}"]);

        let decoded = table.to_vec().unwrap();
        assert_eq!(decoded[1].line.text, decoded[2].line.text);
        assert_eq!(decoded[1].start, 8);
        assert_eq!(decoded[2].start, 8);
        assert_eq!(decoded[3].line.line_index, 3);
    }

    #[test]
    fn test_line_index_survives_serialization() {
        let spans = spans();
        let mut table = LineContextTable::from_lines(LineContextMode::Ordinal, true, &spans);
        table.optimize().unwrap();

        let json = serde_json::to_string(&table).unwrap();
        assert!(!json.contains("line_index\":"));
        let mut loaded: LineContextTable = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.to_vec().unwrap(), spans);
    }

    #[test]
    fn test_stored_line_index_column_rejected() {
        let table = LineContextTable::from_lines(LineContextMode::Ordinal, true, &spans());
        table.validate().unwrap();

        let mut json = serde_json::to_value(&table).unwrap();
        let column = json["codec"]["line_indices"].as_object_mut().unwrap();
        let data = column.remove("data").unwrap();
        column.insert("compressed_data".to_string(), data);
        column.insert("encoding".to_string(), "raw".into());

        let loaded: LineContextTable = serde_json::from_value(json).unwrap();
        assert!(matches!(loaded.validate(), Err(CodecError::Corrupt(_))));
    }

    #[test]
    fn test_line_index_column_must_match_pool() {
        let table = LineContextTable::from_lines(LineContextMode::Ordinal, true, &spans());
        let mut json = serde_json::to_value(&table).unwrap();
        json["value_pool"].as_array_mut().unwrap().pop();

        let loaded: LineContextTable = serde_json::from_value(json).unwrap();
        assert!(loaded.validate().is_err());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("full".parse::<LineContextMode>(), Ok(LineContextMode::Full));
        assert_eq!("ordinal".parse::<LineContextMode>(), Ok(LineContextMode::Ordinal));
        assert!("lines".parse::<LineContextMode>().is_err());
    }
}
