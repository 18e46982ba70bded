//! chunkbench: time chunked array operations over configured data sources.
//!
//! Reads a YAML list of sources, benchmarks every compatible operation
//! against every chunking variant and appends one row per repeat to a CSV
//! table (or JSON lines).

use std::fs::{Metadata, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use chunkbench::logging::{self, Verbosity};
use chunkbench::{
    for_each_record, BenchConfig, ConsoleReporter, CsvReporter, JsonReporter, LocalCluster,
    MultiReporter, Reporter, RunMetadata, RunnerConfig,
};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Jsonl,
}

#[derive(Debug, Parser)]
#[command(
    name = "chunkbench",
    version,
    about = "Benchmark chunked array operations",
    long_about = "
chunkbench expands every source in a YAML config into one variant per
chunking layout and times each compatible operation in open, run and save
phases. Every repeat becomes one output row.

Example:
    chunkbench -c configs/sample.yaml                 # CSV on stdout
    chunkbench -c bench.yaml -o results.csv           # append to a table
    chunkbench -c bench.yaml --repeats 5 --meta commit=abc123
"
)]
struct Cli {
    // ========================================================================
    // Input
    // ========================================================================
    /// Benchmark configuration (YAML)
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Only benchmark sources whose name matches this pattern
    #[arg(long)]
    filter: Option<String>,

    // ========================================================================
    // Execution Options
    // ========================================================================
    /// Timed repeats per source and operation (default: 3, or BENCH_REPEATS)
    #[arg(long)]
    repeats: Option<usize>,

    /// Evaluate chunks on a local worker cluster (default)
    #[arg(long, overrides_with = "no_distributed")]
    distributed: bool,

    /// Evaluate chunks on the global thread pool
    #[arg(long, overrides_with = "distributed")]
    no_distributed: bool,

    // ========================================================================
    // Output Control
    // ========================================================================
    /// Output file, appended to (default: stdout)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Extra column added to every row, as KEY=VALUE (repeatable)
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    meta: Vec<String>,

    /// Verbose output
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Quiet mode (minimal output, only errors)
    #[arg(long, short = 'q')]
    quiet: bool,
}

impl Cli {
    fn use_cluster(&self) -> bool {
        !self.no_distributed
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(Verbosity::from_flags(cli.verbose, cli.quiet));
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let config = BenchConfig::from_yaml_file(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    let mut runner = RunnerConfig::from_env();
    let verbose = runner.verbose && !cli.quiet;
    runner = runner.verbose(verbose);
    if let Some(n) = cli.repeats {
        runner = runner.repeats(n);
    }
    if let Some(pattern) = &cli.filter {
        runner = runner.filter(pattern.clone());
    }

    let cluster = if cli.use_cluster() {
        Some(LocalCluster::new().context("Failed to start local cluster")?)
    } else {
        None
    };

    let mut meta = RunMetadata::local();
    if let Some(cluster) = &cluster {
        meta = meta.with_cluster(cluster);
    }
    for pair in &cli.meta {
        let (key, value) = parse_meta(pair)?;
        meta = meta
            .extra(key, value)
            .with_context(|| format!("Invalid --meta '{}'", pair))?;
    }

    let reporter = build_reporter(&cli, &runner)?;
    reporter.suite_start(&config, &runner);
    let started = Instant::now();

    let drive = || {
        for_each_record(&config, &runner, &meta, |record| {
            reporter.bench_end(&record)?;
            Ok(())
        })
    };
    let outcome = match &cluster {
        Some(cluster) => cluster.install(drive),
        None => drive(),
    };
    if let Some(cluster) = cluster {
        cluster.close();
    }

    let count = outcome.context("Benchmark failed")?;
    reporter
        .suite_end(count, started.elapsed())
        .context("Failed to flush results")?;
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_meta(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => bail!("--meta expects KEY=VALUE, got '{}'", pair),
    }
}

/// A header row goes out unless the sink is a regular file that already has rows.
fn needs_header(meta: &Metadata) -> bool {
    !(meta.is_file() && meta.len() > 0)
}

/// Stdout may be redirected onto an existing table (`>> results.csv`).
#[cfg(unix)]
fn stdout_needs_header() -> bool {
    use std::os::fd::AsFd;

    io::stdout()
        .as_fd()
        .try_clone_to_owned()
        .and_then(|fd| std::fs::File::from(fd).metadata())
        .map_or(true, |meta| needs_header(&meta))
}

#[cfg(not(unix))]
fn stdout_needs_header() -> bool {
    true
}

/// Open the result sink. The flag says whether a header row is needed.
fn open_output(path: Option<&Path>) -> Result<(Box<dyn Write + Send>, bool)> {
    let Some(path) = path else {
        return Ok((Box::new(io::stdout()), stdout_needs_header()));
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open output {}", path.display()))?;
    let meta = file
        .metadata()
        .with_context(|| format!("Failed to stat output {}", path.display()))?;
    Ok((Box::new(BufWriter::new(file)), needs_header(&meta)))
}

fn build_reporter(cli: &Cli, runner: &RunnerConfig) -> Result<MultiReporter> {
    let (out, write_header) = open_output(cli.output.as_deref())?;
    let mut reporters: Vec<Box<dyn Reporter>> = Vec::new();

    if runner.verbose {
        reporters.push(Box::new(ConsoleReporter::new().show_phases(cli.verbose)));
    }
    reporters.push(match cli.format {
        OutputFormat::Csv => Box::new(CsvReporter::new(out, write_header)),
        OutputFormat::Jsonl => Box::new(JsonReporter::new(out)),
    });

    Ok(MultiReporter::new(reporters))
}
