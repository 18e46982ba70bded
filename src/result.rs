//! Benchmark record types.
//!
//! A [`BenchmarkRecord`] is the flat union of three field groups that never
//! share a key: the source descriptor, the operation timing and the run
//! metadata.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::array::ChunkDescriptor;
use crate::error::ConfigError;
use crate::scheduler::LocalCluster;

/// Columns contributed by [`SourceInfo`].
pub const SOURCE_COLUMNS: [&str; 4] = ["source_name", "source_type", "chunks", "nbytes"];

/// Columns contributed by [`OperationTiming`].
pub const TIMING_COLUMNS: [&str; 6] = [
    "op_type",
    "date",
    "time_open",
    "time_run",
    "time_save",
    "time_total",
];

/// Built-in columns of [`RunMetadata`]; caller extras follow these.
pub const META_COLUMNS: [&str; 3] = ["host", "ncpus", "threads"];

/// Timestamp layout used in records.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

fn is_reserved(column: &str) -> bool {
    SOURCE_COLUMNS
        .iter()
        .chain(&TIMING_COLUMNS)
        .chain(&META_COLUMNS)
        .any(|c| *c == column)
}

/// What was benchmarked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub source_name: String,
    pub source_type: String,
    pub chunks: ChunkDescriptor,
    pub nbytes: u64,
}

/// Phase timings of one repeat of one operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationTiming {
    pub op_type: String,
    /// Wall-clock time the repeat started.
    #[serde(with = "date_serde")]
    pub date: DateTime<Local>,
    #[serde(with = "duration_serde")]
    pub time_open: Duration,
    #[serde(with = "duration_serde")]
    pub time_run: Duration,
    #[serde(with = "duration_serde")]
    pub time_save: Duration,
    /// Measured as one span from before open to after save.
    #[serde(with = "duration_serde")]
    pub time_total: Duration,
}

impl OperationTiming {
    /// Sum of the three phase durations.
    pub fn phase_sum(&self) -> Duration {
        self.time_open + self.time_run + self.time_save
    }
}

/// Facts about the invocation attached to every record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub host: String,
    pub ncpus: usize,
    pub threads: usize,
    /// Caller-supplied columns.
    #[serde(flatten)]
    extras: BTreeMap<String, String>,
}

impl RunMetadata {
    /// Metadata for a run without a worker cluster: this host, one cpu, one
    /// thread.
    pub fn local() -> Self {
        Self {
            host: detect_host(),
            ncpus: 1,
            threads: 1,
            extras: BTreeMap::new(),
        }
    }

    /// Record the cluster's size: total threads across workers and the
    /// largest per-worker thread count.
    pub fn with_cluster(mut self, cluster: &LocalCluster) -> Self {
        let nthreads = cluster.nthreads();
        self.ncpus = nthreads.values().sum();
        self.threads = nthreads.values().copied().max().unwrap_or(0);
        self
    }

    /// Add a caller-supplied column.
    ///
    /// Fails when `key` would shadow a built-in column.
    pub fn extra(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let key = key.into();
        if is_reserved(&key) {
            return Err(ConfigError::Invalid(format!(
                "metadata key '{}' collides with a built-in column",
                key
            )));
        }
        self.extras.insert(key, value.into());
        Ok(self)
    }

    pub fn extras(&self) -> &BTreeMap<String, String> {
        &self.extras
    }
}

fn detect_host() -> String {
    for var in ["HOSTNAME", "COMPUTERNAME"] {
        if let Some(host) = std::env::var_os(var).and_then(|h| h.into_string().ok()) {
            if !host.trim().is_empty() {
                return host.trim().to_string();
            }
        }
    }
    #[cfg(unix)]
    {
        if let Ok(host) = std::fs::read_to_string("/etc/hostname") {
            if !host.trim().is_empty() {
                return host.trim().to_string();
            }
        }
    }
    "localhost".to_string()
}

/// One output row: one (source variant, operation, repeat).
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkRecord {
    #[serde(flatten)]
    pub source: SourceInfo,
    #[serde(flatten)]
    pub timing: OperationTiming,
    #[serde(flatten)]
    pub meta: RunMetadata,
}

impl BenchmarkRecord {
    pub fn new(source: SourceInfo, timing: OperationTiming, meta: RunMetadata) -> Self {
        Self {
            source,
            timing,
            meta,
        }
    }

    /// Column names in output order.
    pub fn columns(&self) -> Vec<String> {
        SOURCE_COLUMNS
            .iter()
            .chain(&TIMING_COLUMNS)
            .chain(&META_COLUMNS)
            .map(|c| c.to_string())
            .chain(self.meta.extras.keys().cloned())
            .collect()
    }

    /// Cell values in the same order as [`columns`](Self::columns).
    pub fn values(&self) -> Vec<String> {
        let secs = |d: Duration| d.as_secs_f64().to_string();
        let mut values = vec![
            self.source.source_name.clone(),
            self.source.source_type.clone(),
            self.source.chunks.to_string(),
            self.source.nbytes.to_string(),
            self.timing.op_type.clone(),
            self.timing.date.format(DATE_FORMAT).to_string(),
            secs(self.timing.time_open),
            secs(self.timing.time_run),
            secs(self.timing.time_save),
            secs(self.timing.time_total),
            self.meta.host.clone(),
            self.meta.ncpus.to_string(),
            self.meta.threads.to_string(),
        ];
        values.extend(self.meta.extras.values().cloned());
        values
    }

    /// Value of a single column.
    pub fn get(&self, column: &str) -> Option<String> {
        self.columns()
            .into_iter()
            .zip(self.values())
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }
}

mod duration_serde {
    use serde::{Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs_f64().serialize(s)
    }
}

mod date_serde {
    use chrono::{DateTime, Local};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&d.format(super::DATE_FORMAT))
    }
}
