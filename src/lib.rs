//! # chunkbench
//!
//! A benchmark harness for chunked array workloads.
//!
//! Each source in a YAML configuration is expanded into one variant per
//! chunking layout. Every registered operation the source accepts is then
//! timed in three phases (open, run, save) for a fixed number of repeats,
//! and every repeat becomes one flat [`BenchmarkRecord`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chunkbench::{run_from_config, BenchConfig, RunMetadata, RunnerConfig};
//!
//! let config = BenchConfig::from_yaml_str(
//!     "sources:\n  - type: Random\n    args: {shape: [365, 50]}\n",
//! )?;
//! let records = run_from_config(&config, &RunnerConfig::new(), &RunMetadata::local())?;
//! for r in &records {
//!     println!("{} {} {:?}", r.source.source_name, r.timing.op_type, r.timing.time_total);
//! }
//! # Ok::<(), chunkbench::BenchError>(())
//! ```
//!
//! Configured sources are not cached between repeats: every open phase
//! reloads the data.

pub mod aggregate;
pub mod array;
pub mod config;
pub mod context;
pub mod error;
pub mod glob;
pub mod logging;
pub mod operation;
pub mod report;
pub mod result;
pub mod runner;
pub mod scheduler;
pub mod source;

pub use aggregate::{for_each_record, run_from_config, ResultAggregator};
pub use config::{BenchConfig, OperationFilter, RunnerConfig, SourceConfig};
pub use error::{BenchError, ConfigError};
pub use operation::{all_operations, operation_by_name, Operation};
pub use report::{ConsoleReporter, CsvReporter, JsonReporter, MultiReporter, Reporter};
pub use result::{BenchmarkRecord, OperationTiming, RunMetadata, SourceInfo};
pub use runner::{benchmark, measure_repeat, BenchmarkRun};
pub use scheduler::LocalCluster;
pub use source::{source_factory, Source, SourceVariants};
