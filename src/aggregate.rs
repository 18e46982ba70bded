//! Turning runner output into full benchmark records.

use tracing::{debug, info};

use crate::config::{BenchConfig, RunnerConfig};
use crate::error::Result;
use crate::operation::all_operations;
use crate::result::{BenchmarkRecord, OperationTiming, RunMetadata, SourceInfo};
use crate::runner::benchmark;
use crate::source::source_factory;

/// Joins each `(info, timing)` pair with the run metadata.
pub struct ResultAggregator<I> {
    runs: I,
    meta: RunMetadata,
}

impl<I> ResultAggregator<I>
where
    I: Iterator<Item = Result<(SourceInfo, OperationTiming)>>,
{
    pub fn new(runs: I, meta: RunMetadata) -> Self {
        Self { runs, meta }
    }
}

impl<I> Iterator for ResultAggregator<I>
where
    I: Iterator<Item = Result<(SourceInfo, OperationTiming)>>,
{
    type Item = Result<BenchmarkRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(
            self.runs
                .next()?
                .map(|(info, timing)| BenchmarkRecord::new(info, timing, self.meta.clone())),
        )
    }
}

/// Benchmark every source entry of `config`, handing each record to `sink`
/// as soon as it is measured. Returns the number of records produced.
///
/// The document is validated before any source is built. Entries run in
/// order; the first error from any entry, or from `sink`, ends the run.
pub fn for_each_record<F>(
    config: &BenchConfig,
    runner: &RunnerConfig,
    meta: &RunMetadata,
    mut sink: F,
) -> Result<usize>
where
    F: FnMut(BenchmarkRecord) -> Result<()>,
{
    config.validate()?;
    let operations = all_operations();
    let mut count = 0;

    for (index, entry) in config.sources.iter().enumerate() {
        let sources = source_factory(entry)?.filter(|source| match source {
            Ok(source) => runner.should_run(source.name()),
            Err(_) => true,
        });
        debug!(entry = index, kind = %entry.source_type, "expanding source entry");

        let runs = benchmark(sources, operations, runner.repeats);
        for record in ResultAggregator::new(runs, meta.clone()) {
            sink(record?)?;
            count += 1;
        }
    }

    info!(records = count, "benchmark finished");
    Ok(count)
}

/// Benchmark every source entry of `config` and collect all records.
pub fn run_from_config(
    config: &BenchConfig,
    runner: &RunnerConfig,
    meta: &RunMetadata,
) -> Result<Vec<BenchmarkRecord>> {
    let mut records = Vec::new();
    for_each_record(config, runner, meta, |record| {
        records.push(record);
        Ok(())
    })?;
    Ok(records)
}
