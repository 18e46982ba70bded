//! Pluggable reporters for benchmark output.

use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::{BenchConfig, RunnerConfig};
use crate::result::BenchmarkRecord;

/// Trait for benchmark result reporters.
pub trait Reporter: Send + Sync {
    /// Called once before the first source is built.
    fn suite_start(&self, _config: &BenchConfig, _runner: &RunnerConfig) {}

    /// Called for every record as soon as it is measured.
    fn bench_end(&self, _record: &BenchmarkRecord) -> io::Result<()> {
        Ok(())
    }

    /// Called once after the last record.
    fn suite_end(&self, _records: usize, _elapsed: Duration) -> io::Result<()> {
        Ok(())
    }
}

/// Console reporter that prints progress to stderr.
pub struct ConsoleReporter {
    show_phases: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self { show_phases: false }
    }

    /// Also print the open, run and save split of every repeat.
    pub fn show_phases(mut self, show: bool) -> Self {
        self.show_phases = show;
        self
    }

    fn format_duration(d: Duration) -> String {
        if d.as_secs() > 0 {
            format!("{:.2}s", d.as_secs_f64())
        } else if d.as_millis() > 0 {
            format!("{:.2}ms", d.as_secs_f64() * 1000.0)
        } else {
            format!("{:.2}µs", d.as_secs_f64() * 1_000_000.0)
        }
    }

    fn format_size(nbytes: u64) -> String {
        let n = nbytes as f64;
        if n >= 1e9 {
            format!("{:.2} GB", n / 1e9)
        } else if n >= 1e6 {
            format!("{:.2} MB", n / 1e6)
        } else {
            format!("{:.2} KB", n / 1e3)
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn suite_start(&self, config: &BenchConfig, runner: &RunnerConfig) {
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("  Chunk benchmark: {} source entries", config.sources.len());
        eprintln!("  Repeats: {}", runner.repeats);
        if let Some(filter) = &runner.filter {
            eprintln!("  Filter: {}", filter);
        }
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    fn bench_end(&self, record: &BenchmarkRecord) -> io::Result<()> {
        let timing = &record.timing;
        eprintln!(
            "  {} {} {} [{}, {}]",
            record.source.source_name,
            timing.op_type,
            Self::format_duration(timing.time_total),
            record.source.chunks,
            Self::format_size(record.source.nbytes)
        );
        if self.show_phases {
            eprintln!(
                "      open: {}, run: {}, save: {}",
                Self::format_duration(timing.time_open),
                Self::format_duration(timing.time_run),
                Self::format_duration(timing.time_save)
            );
        }
        Ok(())
    }

    fn suite_end(&self, records: usize, elapsed: Duration) -> io::Result<()> {
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!(
            "  Completed {} records in {:.2}s",
            records,
            elapsed.as_secs_f64()
        );
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        Ok(())
    }
}

struct CsvState {
    out: Box<dyn Write + Send>,
    header_pending: bool,
}

/// Writes records as CSV rows.
///
/// The header comes from the first record's columns.
pub struct CsvReporter {
    state: Mutex<CsvState>,
}

impl CsvReporter {
    /// `write_header` is false when appending to a table that already has one.
    pub fn new(out: Box<dyn Write + Send>, write_header: bool) -> Self {
        Self {
            state: Mutex::new(CsvState {
                out,
                header_pending: write_header,
            }),
        }
    }
}

impl Reporter for CsvReporter {
    fn bench_end(&self, record: &BenchmarkRecord) -> io::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::other("csv writer poisoned"))?;
        if state.header_pending {
            writeln!(state.out, "{}", render_csv_row(&record.columns()))?;
            state.header_pending = false;
        }
        writeln!(state.out, "{}", render_csv_row(&record.values()))
    }

    fn suite_end(&self, _records: usize, _elapsed: Duration) -> io::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::other("csv writer poisoned"))?;
        state.out.flush()
    }
}

/// Join fields into one CSV line, quoting where needed.
pub fn render_csv_row(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| escape_csv(f))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Writes records as JSON lines, one flat object per record.
pub struct JsonReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl Reporter for JsonReporter {
    fn bench_end(&self, record: &BenchmarkRecord) -> io::Result<()> {
        let line = serde_json::to_string(record).map_err(io::Error::other)?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::other("json writer poisoned"))?;
        writeln!(out, "{}", line)
    }

    fn suite_end(&self, _records: usize, _elapsed: Duration) -> io::Result<()> {
        self.out
            .lock()
            .map_err(|_| io::Error::other("json writer poisoned"))?
            .flush()
    }
}

/// Combines multiple reporters.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Reporter for MultiReporter {
    fn suite_start(&self, config: &BenchConfig, runner: &RunnerConfig) {
        for r in &self.reporters {
            r.suite_start(config, runner);
        }
    }

    fn bench_end(&self, record: &BenchmarkRecord) -> io::Result<()> {
        for r in &self.reporters {
            r.bench_end(record)?;
        }
        Ok(())
    }

    fn suite_end(&self, records: usize, elapsed: Duration) -> io::Result<()> {
        for r in &self.reporters {
            r.suite_end(records, elapsed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Local;

    use crate::array::ChunkDescriptor;
    use crate::result::{OperationTiming, RunMetadata, SourceInfo};

    /// In-memory sink that stays readable after the reporter takes it.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn record(chunks: ChunkDescriptor) -> BenchmarkRecord {
        BenchmarkRecord::new(
            SourceInfo {
                source_name: "tiny".to_string(),
                source_type: "Random".to_string(),
                chunks,
                nbytes: 80,
            },
            OperationTiming {
                op_type: "TimeMean".to_string(),
                date: Local::now(),
                time_open: Duration::from_millis(1),
                time_run: Duration::from_millis(1),
                time_save: Duration::from_millis(1),
                time_total: Duration::from_millis(4),
            },
            RunMetadata::local().extra("note", "a \"b\"").unwrap(),
        )
    }

    #[test]
    fn should_format_duration_in_appropriate_units() {
        assert!(ConsoleReporter::format_duration(Duration::from_secs(2)).contains("s"));
        assert!(ConsoleReporter::format_duration(Duration::from_millis(500)).contains("ms"));
        assert!(ConsoleReporter::format_duration(Duration::from_micros(100)).contains("µs"));
    }

    #[test]
    fn should_format_size_in_appropriate_units() {
        assert_eq!(ConsoleReporter::format_size(2_920_000), "2.92 MB");
        assert_eq!(ConsoleReporter::format_size(800), "0.80 KB");
    }

    #[test]
    fn should_quote_fields_when_needed() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("[-1, 20]"), "\"[-1, 20]\"");
        assert_eq!(escape_csv("a \"b\""), "\"a \"\"b\"\"\"");
    }

    #[test]
    fn should_write_header_once_when_requested() {
        let buf = SharedBuf::default();
        let reporter = CsvReporter::new(Box::new(buf.clone()), true);
        reporter.bench_end(&record(ChunkDescriptor::Auto)).unwrap();
        reporter.bench_end(&record(ChunkDescriptor::PerDim(vec![-1, 2]))).unwrap();
        reporter.suite_end(2, Duration::ZERO).unwrap();

        let text = buf.text();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("source_name,source_type,chunks,nbytes,op_type,date,"));
        assert!(lines[0].ends_with("host,ncpus,threads,note"));
        assert!(lines[1].starts_with("tiny,Random,auto,80,TimeMean,"));
        assert!(lines[2].contains("\"[-1, 2]\""));
    }

    #[test]
    fn should_skip_header_when_appending() {
        let buf = SharedBuf::default();
        let reporter = CsvReporter::new(Box::new(buf.clone()), false);
        reporter.bench_end(&record(ChunkDescriptor::Auto)).unwrap();
        assert!(buf.text().starts_with("tiny,"));
    }

    #[test]
    fn should_write_one_json_object_per_line() {
        let buf = SharedBuf::default();
        let reporter = JsonReporter::new(Box::new(buf.clone()));
        reporter.bench_end(&record(ChunkDescriptor::Auto)).unwrap();
        reporter.bench_end(&record(ChunkDescriptor::Auto)).unwrap();

        let text = buf.text();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["chunks"], "auto");
        assert_eq!(value["note"], "a \"b\"");
    }

    #[test]
    fn should_fan_out_to_every_reporter() {
        let a = SharedBuf::default();
        let b = SharedBuf::default();
        let multi = MultiReporter::new(vec![
            Box::new(CsvReporter::new(Box::new(a.clone()), false)),
            Box::new(JsonReporter::new(Box::new(b.clone()))),
        ]);
        multi.bench_end(&record(ChunkDescriptor::Auto)).unwrap();
        assert_eq!(a.text().lines().count(), 1);
        assert_eq!(b.text().lines().count(), 1);
    }
}
