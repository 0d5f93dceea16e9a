use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spantab::index::build::{self, BuildOptions, DEFAULT_GLOB};
use spantab::index::{StoredTable, TableReader, stats};
use spantab::output;
use spantab::tables::LineContextMode;
use spantab::utils::AppConfig;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "spantab")]
#[command(about = "Encode and inspect compact span tables")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show diagnostic logs (honours RUST_LOG)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all logs and progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode analyzer span dumps into table files
    Encode {
        /// Dump files or directories to scan
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// File pattern used when scanning directories
        #[arg(long, default_value = DEFAULT_GLOB)]
        glob: String,

        /// Write tables without delta encoding or compression
        #[arg(long)]
        no_optimize: bool,

        /// Line context layout (defaults to the configured mode)
        #[arg(long)]
        line_mode: Option<LineContextMode>,

        /// Keep absolute offsets in line context (ordinal mode only)
        #[arg(long)]
        span_ranges: bool,
    },
    /// Show table statistics
    Stats {
        /// Table file
        table: PathBuf,
    },
    /// Print the span at an index
    Get {
        /// Table file
        table: PathBuf,

        /// Span index
        index: usize,
    },
    /// Print spans overlapping a byte range
    Range {
        /// Table file
        table: PathBuf,

        /// First byte of the range
        start: u32,

        /// Range length in bytes
        length: u32,
    },
}

fn init_tracing(cli: &Cli) {
    // --quiet: off, --verbose: RUST_LOG or info, default: warnings only
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    let ansi = !(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = AppConfig::load().unwrap_or_else(|err| {
        tracing::warn!("using default config: {err:#}");
        AppConfig::default()
    });
    let color = !(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    match cli.command {
        Commands::Encode {
            inputs,
            output,
            glob,
            no_optimize,
            line_mode,
            span_ranges,
        } => {
            let mut options = BuildOptions::from_config(&config, output);
            options.glob = glob;
            options.optimize = !no_optimize;
            options.include_span_ranges = span_ranges;
            options.silent = cli.quiet;
            if let Some(mode) = line_mode {
                options.line_mode = mode;
            }

            let summary = build::build_tables(&inputs, &options)?;
            if !cli.quiet {
                println!(
                    "Wrote {} tables ({} spans) to {}",
                    summary.written.len(),
                    summary.spans,
                    options.output_dir.display()
                );
                if summary.stats.start_fallbacks > 0 {
                    println!(
                        "{} segments kept absolute starts",
                        summary.stats.start_fallbacks
                    );
                }
            }
            if summary.failed > 0 {
                anyhow::bail!("{} inputs could not be encoded", summary.failed);
            }
        }
        Commands::Stats { table } => {
            stats::show_stats(&table)?;
        }
        Commands::Get { table, index } => {
            let mut stored = TableReader::open_with(&table, &config)?;
            let mut out = output::stdout(color);
            match &mut stored {
                StoredTable::Classification(t) => {
                    let span = t.get(index)?;
                    output::print_classified(&mut out, index, &span)?;
                }
                StoredTable::Reference(t) => {
                    let span = t.get(index)?;
                    let line = t.line(index)?;
                    output::print_reference(&mut out, index, &span, line.as_ref())?;
                }
            }
            out.flush()?;
        }
        Commands::Range {
            table,
            start,
            length,
        } => {
            let mut stored = TableReader::open_with(&table, &config)?;
            let mut out = output::stdout(color);
            let count = print_range(&mut stored, &mut out, start, length)
                .with_context(|| format!("Failed to query {}", table.display()))?;
            out.flush()?;
            tracing::info!(start, length, count, "range query");
        }
    }

    Ok(())
}

/// Print every span overlapping the range; returns how many were printed
fn print_range(
    stored: &mut StoredTable,
    out: &mut termcolor::StandardStream,
    start: u32,
    length: u32,
) -> Result<usize> {
    match stored {
        StoredTable::Classification(t) => {
            let spans = t.get_range_indexed(start, length)?;
            for (index, span) in &spans {
                output::print_classified(out, *index, span)?;
            }
            Ok(spans.len())
        }
        StoredTable::Reference(t) => {
            let spans = t.get_range_indexed(start, length)?;
            for (index, span) in &spans {
                let line = t.line(*index)?;
                output::print_reference(out, *index, span, line.as_ref())?;
            }
            Ok(spans.len())
        }
    }
}
