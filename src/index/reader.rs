use crate::index::writer::{FORMAT_VERSION, StoredTable, TableFile};
use crate::utils::AppConfig;
use anyhow::{Context, Result, bail};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Loads table files written by [`TableWriter`](crate::index::TableWriter)
pub struct TableReader;

impl TableReader {
    /// Load and validate a table; segments stay optimized until touched
    pub fn open(path: &Path) -> Result<StoredTable> {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        if file.metadata()?.len() == 0 {
            bail!("{} is empty", path.display());
        }

        // Table files are written once and never modified in place
        let mmap = unsafe { Mmap::map(&file)? };
        let envelope: TableFile = serde_json::from_slice(&mmap)
            .with_context(|| format!("Failed to parse table file {}", path.display()))?;

        if envelope.version != FORMAT_VERSION {
            bail!(
                "{} has format version {}, expected {}",
                path.display(),
                envelope.version,
                FORMAT_VERSION
            );
        }

        let table = envelope.table;
        table
            .validate()
            .with_context(|| format!("Corrupt table file {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            kind = table.kind(),
            spans = table.len(),
            "table loaded"
        );
        Ok(table)
    }

    /// Load a table and expand it up front when the config asks for it
    pub fn open_with(path: &Path, config: &AppConfig) -> Result<StoredTable> {
        let mut table = Self::open(path)?;
        if config.eager_expand {
            table
                .expand_all(config.parallel_expand)
                .with_context(|| format!("Failed to expand {}", path.display()))?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::writer::TableWriter;
    use crate::tables::{ReferenceKind, ReferenceSpan, ReferenceSymbol, ReferenceTable};
    use std::fs;
    use tempfile::tempdir;

    fn references() -> Vec<ReferenceSpan> {
        (0..300u32)
            .map(|i| ReferenceSpan {
                start: i * 8,
                length: 6,
                symbol: ReferenceSymbol {
                    project_id: "app".to_string(),
                    symbol_id: format!("sym{}", i % 7),
                    kind: ReferenceKind::Reference,
                    display_name: String::new(),
                },
                exclude_from_search: i % 50 == 0,
                related_definition: None,
            })
            .collect()
    }

    #[test]
    fn test_write_then_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("refs.table.json");
        let spans = references();

        let mut table = StoredTable::Reference(ReferenceTable::build(&spans));
        TableWriter::new(&AppConfig::default())
            .write(&path, &mut table)
            .unwrap();

        let StoredTable::Reference(mut loaded) = TableReader::open(&path).unwrap() else {
            panic!("expected a reference table");
        };
        assert!(loaded.references.is_optimized());
        assert_eq!(loaded.references.to_vec().unwrap(), spans);
    }

    #[test]
    fn test_open_with_eager_expand() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("refs.table.json");
        let mut table = StoredTable::Reference(ReferenceTable::build(&references()));
        TableWriter::new(&AppConfig::default())
            .write(&path, &mut table)
            .unwrap();

        let config = AppConfig {
            eager_expand: true,
            ..AppConfig::default()
        };
        let StoredTable::Reference(loaded) = TableReader::open_with(&path, &config).unwrap() else {
            panic!("expected a reference table");
        };
        assert!(!loaded.references.segments()[0].is_optimized());
        assert_eq!(loaded.references.span_at(8).unwrap().start, 64);
    }

    #[test]
    fn test_open_rejects_bad_files() {
        let dir = tempdir().unwrap();

        let empty = dir.path().join("empty.table.json");
        fs::write(&empty, "").unwrap();
        assert!(TableReader::open(&empty).is_err());

        let garbage = dir.path().join("garbage.table.json");
        fs::write(&garbage, "{\"version\":1,\"table\":{\"kind\":\"nope\"}}").unwrap();
        assert!(TableReader::open(&garbage).is_err());

        let future = dir.path().join("future.table.json");
        fs::write(
            &future,
            "{\"version\":99,\"table\":{\"kind\":\"reference\",\"references\":{}}}",
        )
        .unwrap();
        assert!(TableReader::open(&future).is_err());

        assert!(TableReader::open(&dir.path().join("missing.table.json")).is_err());
    }
}
