//! A small chunked, lazily-evaluated array runtime.
//!
//! Arrays are descriptions of a computation: building one (loading a source,
//! taking a mean, grouping by day of year) only records a graph node. Work
//! happens when the array is materialized with [`LazyArray::compute`],
//! [`LazyArray::compute_mean`] or [`LazyArray::to_file`]. Evaluation is spread
//! across blocks on the current rayon pool.
//!
//! The benchmark harness treats this module as a black box with measurable
//! latency.

mod chunks;
mod graph;
mod store;
mod time;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

pub use chunks::{ChunkDescriptor, Chunking, AUTO_CHUNK_BYTES, WHOLE_AXIS};
pub use graph::GroupStrategy;
pub use store::{open_mfdataset, write_dataset};

use graph::Node;

/// Bytes per element. Every array holds `f64` values.
pub const ITEMSIZE: usize = std::mem::size_of::<f64>();

/// Bytes needed to hold an array of `shape`, or `None` if that overflows.
pub fn shape_nbytes(shape: &[usize]) -> Option<usize> {
    shape
        .iter()
        .try_fold(ITEMSIZE, |bytes, &len| bytes.checked_mul(len))
}

/// Failures raised by the array runtime.
#[derive(Debug, Error)]
pub enum ArrayError {
    #[error("unknown dimension '{0}'")]
    UnknownDimension(String),

    #[error("invalid chunk size {size} for dimension '{dim}'")]
    InvalidChunk { dim: String, size: i64 },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("no coordinate for dimension '{0}'")]
    MissingCoordinate(String),

    #[error("unsupported time units '{0}'")]
    TimeUnits(String),

    #[error("variable '{var}' not found in {path}")]
    MissingVariable { var: String, path: PathBuf },

    #[error("malformed array file {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("no files match '{0}'")]
    NoFiles(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Labelled values along one dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub name: String,
    pub values: Arc<[f64]>,
    /// CF-style units, e.g. `days since 2001-01-01`.
    pub units: Option<String>,
}

impl Coordinate {
    /// `0, 1, .., len - 1` along `name`.
    pub fn arange(name: impl Into<String>, len: usize, units: Option<&str>) -> Self {
        Self {
            name: name.into(),
            values: (0..len).map(|i| i as f64).collect(),
            units: units.map(str::to_string),
        }
    }
}

/// How to label positions along an axis before grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    /// Calendar day of year decoded from a `days since ...` time coordinate.
    DayOfYear,
}

/// A lazily-evaluated, chunked n-dimensional array of `f64`.
#[derive(Debug, Clone)]
pub struct LazyArray {
    name: String,
    dims: Vec<String>,
    shape: Vec<usize>,
    chunks: Vec<Vec<usize>>,
    coords: Vec<Coordinate>,
    node: Arc<Node>,
}

impl LazyArray {
    /// Uniform random values in `[0, 1)`, generated block by block from `seed`.
    pub fn random(
        name: impl Into<String>,
        dims: Vec<String>,
        shape: Vec<usize>,
        coords: Vec<Coordinate>,
        chunking: &Chunking,
        seed: u64,
    ) -> Result<Self, ArrayError> {
        let chunks = chunking.normalize(&dims, &shape)?;
        Ok(Self {
            name: name.into(),
            dims,
            shape,
            chunks,
            coords,
            node: Arc::new(Node::Random { seed }),
        })
    }

    pub(crate) fn from_node(
        name: String,
        dims: Vec<String>,
        shape: Vec<usize>,
        chunks: Vec<Vec<usize>>,
        coords: Vec<Coordinate>,
        node: Node,
    ) -> Self {
        Self {
            name,
            dims,
            shape,
            chunks,
            coords,
            node: Arc::new(node),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Block sizes along each axis.
    pub fn chunks(&self) -> &[Vec<usize>] {
        &self.chunks
    }

    pub fn coords(&self) -> &[Coordinate] {
        &self.coords
    }

    /// Length of a named dimension.
    pub fn size_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim).map(|i| self.shape[i])
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the materialized array in bytes.
    pub fn nbytes(&self) -> u64 {
        (self.len() * ITEMSIZE) as u64
    }

    pub fn coord(&self, dim: &str) -> Option<&Coordinate> {
        self.coords.iter().find(|c| c.name == dim)
    }

    fn axis_of(&self, dim: &str) -> Result<usize, ArrayError> {
        self.dims
            .iter()
            .position(|d| d == dim)
            .ok_or_else(|| ArrayError::UnknownDimension(dim.to_string()))
    }

    /// Mean along `dim`, dropping that dimension.
    pub fn mean_over(&self, dim: &str) -> Result<LazyArray, ArrayError> {
        let axis = self.axis_of(dim)?;
        let mut dims = self.dims.clone();
        let mut shape = self.shape.clone();
        let mut chunks = self.chunks.clone();
        dims.remove(axis);
        shape.remove(axis);
        chunks.remove(axis);
        let coords = self.coords.iter().filter(|c| c.name != dim).cloned().collect();

        Ok(Self::from_node(
            self.name.clone(),
            dims,
            shape,
            chunks,
            coords,
            Node::Mean {
                input: self.clone(),
                axis,
            },
        ))
    }

    /// Group positions along `dim` by `key` and take the mean of each group.
    ///
    /// The grouped dimension is replaced by one named after the key, holding
    /// one entry per distinct label in ascending order.
    pub fn groupby_mean(
        &self,
        dim: &str,
        key: GroupKey,
        strategy: GroupStrategy,
    ) -> Result<LazyArray, ArrayError> {
        let axis = self.axis_of(dim)?;
        let coord = self
            .coord(dim)
            .ok_or_else(|| ArrayError::MissingCoordinate(dim.to_string()))?;

        let (group_dim, groups) = match key {
            GroupKey::DayOfYear => ("dayofyear", time::day_of_year_groups(coord)?),
        };
        let ngroups = groups.labels.len();

        let mut dims = self.dims.clone();
        let mut shape = self.shape.clone();
        let mut chunks = self.chunks.clone();
        dims[axis] = group_dim.to_string();
        shape[axis] = ngroups;
        chunks[axis] = match strategy {
            // One output block per group, as a plain groupby produces.
            GroupStrategy::Gather => vec![1; ngroups],
            GroupStrategy::Blocked => vec![ngroups],
        };
        let coords = self
            .coords
            .iter()
            .filter(|c| c.name != dim)
            .cloned()
            .chain(std::iter::once(Coordinate {
                name: group_dim.to_string(),
                values: groups.labels.iter().map(|&l| l as f64).collect(),
                units: None,
            }))
            .collect();

        Ok(Self::from_node(
            self.name.clone(),
            dims,
            shape,
            chunks,
            coords,
            Node::GroupMean {
                input: self.clone(),
                axis,
                assignment: groups.assignment.into(),
                ngroups,
                strategy,
            },
        ))
    }

    /// Evaluate the graph, returning values in row-major order.
    pub fn compute(&self) -> Result<Vec<f64>, ArrayError> {
        graph::evaluate(self)
    }

    /// Evaluate the graph and reduce every element to a single mean.
    pub fn compute_mean(&self) -> Result<f64, ArrayError> {
        let values = self.compute()?;
        Ok(graph::mean_of(&values))
    }

    /// Materialize into a single-variable array file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ArrayError> {
        write_dataset(path, &[self])
    }
}
