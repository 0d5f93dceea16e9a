use crate::error::Result as CodecResult;
use crate::index::types::{CodecContext, CodecStats};
use crate::tables::{ClassificationTable, ReferenceTable};
use crate::utils::AppConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Version written into every table file
pub const FORMAT_VERSION: u32 = 1;

/// A persisted table of either kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoredTable {
    Classification(ClassificationTable),
    Reference(ReferenceTable),
}

impl StoredTable {
    pub fn kind(&self) -> &'static str {
        match self {
            StoredTable::Classification(_) => "classification",
            StoredTable::Reference(_) => "reference",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StoredTable::Classification(table) => table.len(),
            StoredTable::Reference(table) => table.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn optimize_with(&mut self, ctx: &mut CodecContext) -> CodecResult<()> {
        match self {
            StoredTable::Classification(table) => table.optimize_with(ctx),
            StoredTable::Reference(table) => table.optimize_with(ctx),
        }
    }

    pub fn expand_all(&mut self, parallel: bool) -> CodecResult<()> {
        match self {
            StoredTable::Classification(table) => table.expand_all(parallel),
            StoredTable::Reference(table) => table.expand_all(parallel),
        }
    }

    pub fn validate(&self) -> CodecResult<()> {
        match self {
            StoredTable::Classification(table) => table.validate(),
            StoredTable::Reference(table) => table.validate(),
        }
    }

    pub fn estimated_size(&self) -> usize {
        match self {
            StoredTable::Classification(table) => table.estimated_size(),
            StoredTable::Reference(table) => table.estimated_size(),
        }
    }
}

/// On-disk envelope
#[derive(Serialize, Deserialize)]
pub(crate) struct TableFile {
    pub version: u32,
    pub table: StoredTable,
}

#[derive(Serialize)]
struct TableFileRef<'a> {
    version: u32,
    table: &'a StoredTable,
}

/// Writes tables as JSON, optimizing them first unless told otherwise
pub struct TableWriter {
    compression_level: i32,
    optimize: bool,
}

impl TableWriter {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            compression_level: config.compression_level,
            optimize: true,
        }
    }

    pub fn optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// Write `table` to `path`, returning the codec counters of the
    /// optimization pass
    pub fn write(&self, path: &Path, table: &mut StoredTable) -> Result<CodecStats> {
        let mut ctx = CodecContext::new(self.compression_level);
        if self.optimize {
            table
                .optimize_with(&mut ctx)
                .with_context(|| format!("Failed to optimize table for {}", path.display()))?;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let envelope = TableFileRef {
            version: FORMAT_VERSION,
            table: &*table,
        };
        serde_json::to_writer(&mut writer, &envelope).context("Failed to serialize table")?;
        writer.flush()?;

        tracing::debug!(
            path = %path.display(),
            spans = table.len(),
            stored_bytes = table.estimated_size(),
            fallbacks = ctx.stats.start_fallbacks,
            "table written"
        );
        Ok(ctx.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{Classification, ClassifiedSpan};
    use tempfile::tempdir;

    #[test]
    fn test_write_optimizes_by_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.table.json");
        let spans: Vec<ClassifiedSpan> = (0..10u32)
            .map(|i| ClassifiedSpan {
                start: i * 6,
                length: 5,
                classification: Classification::new("keyword", "#569cd6"),
                local_scope_id: 0,
                local_scope_depth: 0,
            })
            .collect();
        let mut table = StoredTable::Classification(ClassificationTable::from_spans(&spans));

        let stats = TableWriter::new(&AppConfig::default())
            .write(&path, &mut table)
            .unwrap();
        assert_eq!(stats.segments_optimized, 1);

        let json = fs::read_to_string(&path).unwrap();
        assert!(json.starts_with("{\"version\":1"));
        assert!(json.contains("\"kind\":\"classification\""));
    }

    #[test]
    fn test_write_without_optimize() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.table.json");
        let mut table = StoredTable::Reference(ReferenceTable::build(&[]));

        let stats = TableWriter::new(&AppConfig::default())
            .optimize(false)
            .write(&path, &mut table)
            .unwrap();
        assert_eq!(stats, CodecStats::default());
        assert!(path.exists());
    }
}
