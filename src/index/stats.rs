use crate::index::reader::TableReader;
use crate::index::table::{SpanCodec, SpanTable};
use crate::index::writer::StoredTable;
use anyhow::Result;
use serde::Serialize;
use std::path::Path;

/// Shape and size of one span table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub spans: usize,
    pub segments: usize,
    pub pool_size: usize,
    /// Bytes held by segment columns as stored
    pub estimated_size: usize,
    /// Bytes the same columns take expanded
    pub raw_size: usize,
    pub optimized_segments: usize,
    /// Optimized segments whose starts stayed absolute
    pub start_fallbacks: usize,
    pub sorted: bool,
}

impl<C: SpanCodec> SpanTable<C> {
    pub fn stats(&self) -> TableStats {
        let optimized: Vec<_> = self.segments().iter().filter(|s| s.is_optimized()).collect();
        TableStats {
            spans: self.len(),
            segments: self.segments().len(),
            pool_size: self.value_pool().len(),
            estimated_size: self.estimated_size(),
            raw_size: self.raw_size(),
            optimized_segments: optimized.len(),
            start_fallbacks: optimized.iter().filter(|s| s.core.starts_expanded()).count(),
            sorted: self.is_sorted(),
        }
    }
}

impl TableStats {
    /// Stored size as a fraction of the expanded size
    pub fn ratio(&self) -> f64 {
        if self.raw_size == 0 {
            1.0
        } else {
            self.estimated_size as f64 / self.raw_size as f64
        }
    }
}

/// Display statistics for a table file
pub fn show_stats(path: &Path) -> Result<()> {
    let file_size = std::fs::metadata(path)?.len();
    let table = TableReader::open(path)?;

    println!("Table Statistics");
    println!("================");
    println!();
    println!("File:             {}", path.display());
    println!("Kind:             {}", table.kind());
    println!("File size:        {}", format_size(file_size));

    match &table {
        StoredTable::Classification(table) => print_table("Spans", &table.stats()),
        StoredTable::Reference(table) => {
            print_table("References", &table.references.stats());
            match &table.line_context {
                Some(lines) => {
                    println!();
                    println!("Line mode:        {:?}", lines.codec().mode());
                    print_table("Line context", &lines.stats());
                }
                None => println!("Line context:     none"),
            }
        }
    }

    Ok(())
}

fn print_table(title: &str, stats: &TableStats) {
    println!();
    println!("{title}:");
    println!("  Span count:       {}", stats.spans);
    println!("  Segment count:    {}", stats.segments);
    println!("  Pool size:        {}", stats.pool_size);
    println!("  Sorted:           {}", stats.sorted);
    println!(
        "  Optimized:        {} ({} with absolute starts)",
        stats.optimized_segments, stats.start_fallbacks
    );
    println!("  Stored columns:   {}", format_size(stats.estimated_size as u64));
    println!("  Expanded columns: {}", format_size(stats.raw_size as u64));
    println!("  Ratio:            {:.1}%", stats.ratio() * 100.0);
}

/// Format byte size to human readable
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{Classification, ClassificationTable, ClassifiedSpan};

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(12), "12 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_table_stats() {
        let spans: Vec<ClassifiedSpan> = (0..5000u32)
            .map(|i| ClassifiedSpan {
                start: i * 2,
                length: 1,
                classification: Classification::new(["a", "b", "c"][i as usize % 3], ""),
                local_scope_id: 0,
                local_scope_depth: 0,
            })
            .collect();
        let mut table = ClassificationTable::from_spans(&spans);

        let before = table.stats();
        assert_eq!(before.spans, 5000);
        assert_eq!(before.segments, 2);
        assert_eq!(before.pool_size, 3);
        assert_eq!(before.optimized_segments, 0);
        assert_eq!(before.estimated_size, before.raw_size);

        table.optimize().unwrap();
        let after = table.stats();
        assert_eq!(after.optimized_segments, 2);
        assert_eq!(after.start_fallbacks, 0);
        assert!(after.estimated_size < before.estimated_size);
        assert!(after.ratio() < 1.0);
    }
}
