//! Operations benchmarked against every compatible source.
//!
//! Every operation type is listed in [`OPERATION_TABLE`]; [`all_operations`]
//! instantiates the table once per process and hands out the same shared
//! instances from then on.

use std::sync::OnceLock;

use tempfile::NamedTempFile;

use crate::array::{ArrayError, GroupKey, GroupStrategy, LazyArray};
use crate::error::{BenchError, Result};

/// Dimension the built-in operations reduce over.
pub const TIME_DIM: &str = "time";

/// A pure array transform plus a way to force its evaluation.
pub trait Operation: Send + Sync {
    /// Stable type name, used in allow-lists and as `op_type` in records.
    fn identity(&self) -> &'static str;

    /// Build the output graph. Usually does no computation.
    fn run(&self, array: &LazyArray) -> Result<LazyArray, ArrayError>;

    /// Materialize `output` into a fresh, discardable sink.
    fn save(&self, output: &LazyArray) -> Result<()> {
        let sink = NamedTempFile::new()?;
        output.to_file(sink.path())?;
        Ok(())
    }
}

/// Mean over the time axis.
#[derive(Debug, Default)]
pub struct TimeMean;

impl Operation for TimeMean {
    fn identity(&self) -> &'static str {
        "TimeMean"
    }

    fn run(&self, array: &LazyArray) -> Result<LazyArray, ArrayError> {
        array.mean_over(TIME_DIM)
    }
}

/// Day-of-year climatology computed as a plain groupby.
#[derive(Debug, Default)]
pub struct Climatology;

impl Operation for Climatology {
    fn identity(&self) -> &'static str {
        "Climatology"
    }

    fn run(&self, array: &LazyArray) -> Result<LazyArray, ArrayError> {
        array.groupby_mean(TIME_DIM, GroupKey::DayOfYear, GroupStrategy::Gather)
    }
}

/// Day-of-year climatology reduced block by block along time.
#[derive(Debug, Default)]
pub struct ClimatologyBlocked;

impl Operation for ClimatologyBlocked {
    fn identity(&self) -> &'static str {
        "ClimatologyBlocked"
    }

    fn run(&self, array: &LazyArray) -> Result<LazyArray, ArrayError> {
        array.groupby_mean(TIME_DIM, GroupKey::DayOfYear, GroupStrategy::Blocked)
    }
}

/// Builds a fresh instance of one operation type.
pub type OperationConstructor = fn() -> Box<dyn Operation>;

fn boxed<O: Operation + Default + 'static>() -> Box<dyn Operation> {
    Box::new(O::default())
}

/// Registered operation types, in benchmark order.
pub const OPERATION_TABLE: &[(&str, OperationConstructor)] = &[
    ("TimeMean", boxed::<TimeMean> as OperationConstructor),
    ("Climatology", boxed::<Climatology> as OperationConstructor),
    ("ClimatologyBlocked", boxed::<ClimatologyBlocked> as OperationConstructor),
];

static OPERATIONS: OnceLock<Vec<Box<dyn Operation>>> = OnceLock::new();

/// One shared instance of every registered operation.
pub fn all_operations() -> &'static [Box<dyn Operation>] {
    OPERATIONS.get_or_init(|| OPERATION_TABLE.iter().map(|(_, make)| make()).collect())
}

/// Older names still accepted in configuration, with the identity they map to.
const OPERATION_ALIASES: &[(&str, &str)] = &[("ClimatologyClimtas", "ClimatologyBlocked")];

/// The registered identity for `name`, resolving aliases.
pub fn canonical_operation_name(name: &str) -> &str {
    OPERATION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |(_, identity)| identity)
}

/// Look up a registered operation by identity or alias.
pub fn operation_by_name(name: &str) -> Result<&'static dyn Operation> {
    let identity = canonical_operation_name(name);
    all_operations()
        .iter()
        .find(|op| op.identity() == identity)
        .map(|op| &**op)
        .ok_or_else(|| BenchError::UnknownOperationType(name.to_string()))
}
