use crate::index::types::CodecStats;
use crate::index::writer::{StoredTable, TableWriter};
use crate::tables::{
    ClassificationTable, ClassifiedSpan, LineContextMode, ReferenceSpan, ReferenceTable,
};
use crate::utils::{AppConfig, progress};
use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default file pattern for analyzer dumps
pub const DEFAULT_GLOB: &str = "*.spans.json";

const DUMP_SUFFIX: &str = ".spans.json";
const TABLE_SUFFIX: &str = ".table.json";

/// Spans of one document as produced by an analyzer
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SpanDump {
    Classification {
        spans: Vec<ClassifiedSpan>,
    },
    Reference {
        spans: Vec<ReferenceSpan>,
        /// Document text; when present a line-context table is attached
        #[serde(default)]
        source: Option<String>,
    },
}

impl SpanDump {
    pub fn into_table(self, options: &BuildOptions) -> StoredTable {
        match self {
            SpanDump::Classification { spans } => {
                StoredTable::Classification(ClassificationTable::from_spans(&spans))
            }
            SpanDump::Reference {
                spans,
                source: Some(source),
            } => StoredTable::Reference(ReferenceTable::with_source(
                &spans,
                &source,
                options.line_mode,
                options.include_span_ranges,
            )),
            SpanDump::Reference { spans, source: None } => {
                StoredTable::Reference(ReferenceTable::build(&spans))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub output_dir: PathBuf,
    pub glob: String,
    pub optimize: bool,
    pub line_mode: LineContextMode,
    /// Keep absolute offsets in line-context tables (ordinal mode only)
    pub include_span_ranges: bool,
    pub compression_level: i32,
    pub silent: bool,
}

impl BuildOptions {
    pub fn from_config(config: &AppConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            glob: DEFAULT_GLOB.to_string(),
            optimize: true,
            line_mode: config.line_context_mode,
            include_span_ranges: false,
            compression_level: config.compression_level,
            silent: false,
        }
    }

    fn writer(&self) -> TableWriter {
        let config = AppConfig {
            compression_level: self.compression_level,
            ..AppConfig::default()
        };
        TableWriter::new(&config).optimize(self.optimize)
    }
}

/// Outcome of a bulk build
#[derive(Debug, Default)]
pub struct BuildSummary {
    pub written: Vec<PathBuf>,
    pub failed: usize,
    pub spans: usize,
    pub stats: CodecStats,
}

/// Encode one dump file into `options.output_dir`
pub fn encode_file(path: &Path, options: &BuildOptions) -> Result<(PathBuf, usize, CodecStats)> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let dump: SpanDump = serde_json::from_slice(&content)
        .with_context(|| format!("Failed to parse span dump {}", path.display()))?;

    let mut table = dump.into_table(options);
    let output = output_path(path, &options.output_dir);
    let stats = options.writer().write(&output, &mut table)?;

    tracing::info!(
        input = %path.display(),
        output = %output.display(),
        kind = table.kind(),
        spans = table.len(),
        "encoded"
    );
    Ok((output, table.len(), stats))
}

/// Encode every dump found under `inputs`
pub fn build_tables(inputs: &[PathBuf], options: &BuildOptions) -> Result<BuildSummary> {
    let matcher = Glob::new(&options.glob)
        .with_context(|| format!("Invalid glob pattern '{}'", options.glob))?
        .compile_matcher();
    let files = collect_inputs(inputs, &matcher)?;

    fs::create_dir_all(&options.output_dir).with_context(|| {
        format!("Failed to create output directory {}", options.output_dir.display())
    })?;

    let progress_bar = progress::counter(files.len() as u64, "Encoding span dumps", options.silent);
    let failed = AtomicUsize::new(0);

    let encoded: Vec<(PathBuf, usize, CodecStats)> = files
        .par_iter()
        .filter_map(|path| {
            let result = encode_file(path, options);
            if let Some(ref pb) = progress_bar {
                pb.inc(1);
            }
            match result {
                Ok(encoded) => Some(encoded),
                Err(err) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(input = %path.display(), "skipped: {err:#}");
                    None
                }
            }
        })
        .collect();

    if let Some(pb) = progress_bar {
        pb.finish_with_message(format!("Encoded {} files", encoded.len()));
    }

    let mut summary = BuildSummary {
        failed: failed.load(Ordering::Relaxed),
        ..BuildSummary::default()
    };
    for (path, spans, stats) in encoded {
        summary.written.push(path);
        summary.spans += spans;
        summary.stats.segments_optimized += stats.segments_optimized;
        summary.stats.start_fallbacks += stats.start_fallbacks;
        summary.stats.columns_compressed += stats.columns_compressed;
        summary.stats.columns_stored_raw += stats.columns_stored_raw;
    }
    Ok(summary)
}

/// Explicit files are taken as-is; directories are walked and filtered by `matcher`
fn collect_inputs(inputs: &[PathBuf], matcher: &GlobMatcher) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
            continue;
        }
        if !input.is_dir() {
            anyhow::bail!("Input not found: {}", input.display());
        }

        let walker = WalkBuilder::new(input)
            .hidden(true)
            .git_ignore(true)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !matches!(name.as_ref(), ".git" | "target" | "node_modules")
            })
            .build();

        let mut found: Vec<PathBuf> = walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter(|entry| matcher.is_match(entry.file_name()))
            .map(|entry| entry.into_path())
            .collect();
        found.sort();
        files.extend(found);
    }

    Ok(files)
}

/// `<dir>/<name>.spans.json` becomes `<output_dir>/<name>.table.json`
pub fn output_path(input: &Path, output_dir: &Path) -> PathBuf {
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = match file_name.strip_suffix(DUMP_SUFFIX) {
        Some(stem) => stem.to_string(),
        None => input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "table".to_string()),
    };
    output_dir.join(format!("{stem}{TABLE_SUFFIX}"))
}
