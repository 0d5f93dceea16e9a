//! Syntax classification spans.

use crate::error::Result;
use crate::index::column::PackedColumn;
use crate::index::segment::SideColumns;
use crate::index::table::{SpanCodec, SpanTable};
use crate::index::types::{CodecContext, Extent};
use serde::{Deserialize, Serialize};

/// Classification tag, e.g. `keyword` with its editor color
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub name: String,
    /// `#rrggbb`, or empty when the renderer should pick
    #[serde(default)]
    pub default_color: String,
}

impl Classification {
    pub fn new(name: impl Into<String>, default_color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_color: default_color.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedSpan {
    pub start: u32,
    pub length: u32,
    pub classification: Classification,
    #[serde(default)]
    pub local_scope_id: u32,
    #[serde(default)]
    pub local_scope_depth: u32,
}

/// Scope columns; a column is left out when every span in the segment is 0
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeColumns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_scope_id: Option<PackedColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_scope_depth: Option<PackedColumn>,
}

impl ScopeColumns {
    fn columns_mut(&mut self) -> impl Iterator<Item = &mut PackedColumn> {
        self.local_scope_id
            .iter_mut()
            .chain(self.local_scope_depth.iter_mut())
    }

    fn columns(&self) -> impl Iterator<Item = &PackedColumn> {
        self.local_scope_id.iter().chain(self.local_scope_depth.iter())
    }
}

impl SideColumns for ScopeColumns {
    fn optimize(&mut self, ctx: &mut CodecContext) -> Result<()> {
        self.columns_mut().try_for_each(|c| c.optimize(ctx))
    }

    fn expand(&mut self, ctx: &mut CodecContext) -> Result<()> {
        self.columns_mut().try_for_each(|c| c.expand(ctx))
    }

    fn stored_len(&self) -> usize {
        self.columns().map(|c| c.stored_len()).sum()
    }

    fn raw_len(&self) -> usize {
        self.columns().map(|c| c.raw_len()).sum()
    }

    fn is_consistent(&self, len: usize, optimized: bool) -> bool {
        self.columns()
            .all(|c| c.len() == len && (optimized || c.is_expanded()))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ClassificationCodec;

impl SpanCodec for ClassificationCodec {
    type Span = ClassifiedSpan;
    type Tag = Classification;
    type TagKey = Classification;
    type Side = ScopeColumns;

    fn extent(&self, span: &ClassifiedSpan) -> Extent {
        Extent::new(span.start, span.length)
    }

    fn shared_key(&self, span: &ClassifiedSpan) -> Classification {
        span.classification.clone()
    }

    fn shared(&self, span: &ClassifiedSpan) -> Classification {
        span.classification.clone()
    }

    fn create_segment(&self, spans: &[ClassifiedSpan]) -> ScopeColumns {
        let ids: Vec<u32> = spans.iter().map(|s| s.local_scope_id).collect();
        let depths: Vec<u32> = spans.iter().map(|s| s.local_scope_depth).collect();
        ScopeColumns {
            local_scope_id: PackedColumn::from_values_or_none(&ids),
            local_scope_depth: PackedColumn::from_values_or_none(&depths),
        }
    }

    fn create_span(
        &self,
        extent: Extent,
        shared: &Classification,
        _pool_index: u32,
        side: &ScopeColumns,
        offset: usize,
    ) -> ClassifiedSpan {
        ClassifiedSpan {
            start: extent.start,
            length: extent.length,
            classification: shared.clone(),
            local_scope_id: side.local_scope_id.as_ref().map_or(0, |c| c.get(offset)),
            local_scope_depth: side.local_scope_depth.as_ref().map_or(0, |c| c.get(offset)),
        }
    }
}

pub type ClassificationTable = SpanTable<ClassificationCodec>;

impl SpanTable<ClassificationCodec> {
    pub fn from_spans(spans: &[ClassifiedSpan]) -> Self {
        SpanTable::build(ClassificationCodec, spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    fn span(start: u32, length: u32, name: &str, scope: (u32, u32)) -> ClassifiedSpan {
        ClassifiedSpan {
            start,
            length,
            classification: Classification::new(name, ""),
            local_scope_id: scope.0,
            local_scope_depth: scope.1,
        }
    }

    #[test]
    fn test_default_scope_columns_elided() {
        let spans: Vec<ClassifiedSpan> = (0..100u32)
            .map(|i| span(i * 4, 3, if i % 2 == 0 { "keyword" } else { "identifier" }, (0, 0)))
            .collect();
        let mut table = ClassificationTable::from_spans(&spans);

        let side = &table.segments()[0].side;
        assert!(side.local_scope_id.is_none());
        assert!(side.local_scope_depth.is_none());

        table.optimize().unwrap();
        for i in 0..spans.len() {
            let decoded = table.get(i).unwrap();
            assert_eq!(decoded.local_scope_depth, 0);
            assert_eq!(decoded, spans[i]);
        }
    }

    #[test]
    fn test_only_depth_elided() {
        let spans = vec![
            span(0, 2, "keyword", (7, 0)),
            span(3, 5, "identifier", (7, 0)),
            span(9, 1, "punctuation", (8, 0)),
        ];
        let mut table = ClassificationTable::from_spans(&spans);
        let side = &table.segments()[0].side;
        assert!(side.local_scope_id.is_some());
        assert!(side.local_scope_depth.is_none());

        table.optimize().unwrap();
        assert_eq!(table.to_vec().unwrap(), spans);
    }

    #[test]
    fn test_scope_columns_roundtrip() {
        let spans: Vec<ClassifiedSpan> = (0..5000u32)
            .map(|i| span(i * 3, 2, "string", (i / 10, i % 4)))
            .collect();
        let mut table = ClassificationTable::from_spans(&spans);
        table.optimize().unwrap();

        let json = serde_json::to_string(&table).unwrap();
        let mut loaded: ClassificationTable = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.to_vec().unwrap(), spans);
        assert_eq!(loaded.get_range(30, 3).unwrap(), vec![spans[10].clone()]);
    }

    /// Rewrite an expanded JSON column as a stored raw payload
    fn store_column(column: &mut serde_json::Value) {
        let column = column.as_object_mut().unwrap();
        let data = column.remove("data").unwrap();
        column.insert("compressed_data".to_string(), data);
        column.insert("encoding".to_string(), "raw".into());
    }

    #[test]
    fn test_stored_side_column_in_expanded_segment_rejected() {
        let spans: Vec<ClassifiedSpan> = (0..10u32).map(|i| span(i * 2, 1, "type", (i, 1))).collect();
        let table = ClassificationTable::from_spans(&spans);
        let mut json = serde_json::to_value(&table).unwrap();
        store_column(&mut json["segments"][0]["side"]["local_scope_id"]);

        let loaded: ClassificationTable = serde_json::from_value(json.clone()).unwrap();
        assert!(matches!(loaded.validate(), Err(CodecError::Corrupt(_))));

        // The same payload is fine once the segment says it needs expanding
        json["segments"][0]["core"]["optimized"] = true.into();
        let mut loaded: ClassificationTable = serde_json::from_value(json).unwrap();
        loaded.validate().unwrap();
        assert_eq!(loaded.get(3).unwrap(), spans[3]);
    }

    #[test]
    fn test_pool_keyed_by_name_and_color() {
        let spans = vec![
            ClassifiedSpan {
                classification: Classification::new("comment", "#6a9955"),
                ..span(0, 4, "", (0, 0))
            },
            ClassifiedSpan {
                classification: Classification::new("comment", "#808080"),
                ..span(5, 4, "", (0, 0))
            },
            ClassifiedSpan {
                classification: Classification::new("comment", "#6a9955"),
                ..span(10, 4, "", (0, 0))
            },
        ];
        let table = ClassificationTable::from_spans(&spans);
        assert_eq!(table.value_pool().len(), 2);
    }
}
