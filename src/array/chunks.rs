//! Chunking specifications and their normalization to per-axis block sizes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{shape_nbytes, ArrayError, ITEMSIZE};

/// Block size meaning "the whole axis".
pub const WHOLE_AXIS: i64 = -1;

/// Largest block the runtime builds on its own when chunking is `auto`.
pub const AUTO_CHUNK_BYTES: usize = 128 * 1024 * 1024;

/// How an array should be partitioned into blocks.
///
/// In configuration files this is either the string `"auto"` or a mapping
/// from dimension name to block size (`-1` for the whole axis).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ChunkingRepr", into = "ChunkingRepr")]
pub enum Chunking {
    /// Let the runtime choose the block shape.
    #[default]
    Auto,
    /// Explicit block size per dimension.
    Explicit(BTreeMap<String, i64>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ChunkingRepr {
    Tag(String),
    Sizes(BTreeMap<String, i64>),
}

impl TryFrom<ChunkingRepr> for Chunking {
    type Error = String;

    fn try_from(repr: ChunkingRepr) -> Result<Self, Self::Error> {
        match repr {
            ChunkingRepr::Tag(tag) if tag == "auto" => Ok(Chunking::Auto),
            ChunkingRepr::Tag(tag) => Err(format!(
                "unknown chunking '{}', expected \"auto\" or a mapping of dimension sizes",
                tag
            )),
            ChunkingRepr::Sizes(sizes) => Ok(Chunking::Explicit(sizes)),
        }
    }
}

impl From<Chunking> for ChunkingRepr {
    fn from(chunking: Chunking) -> Self {
        match chunking {
            Chunking::Auto => ChunkingRepr::Tag("auto".to_string()),
            Chunking::Explicit(sizes) => ChunkingRepr::Sizes(sizes),
        }
    }
}

impl Chunking {
    /// Build an explicit chunking from `(dim, size)` pairs.
    pub fn explicit<I, K>(sizes: I) -> Self
    where
        I: IntoIterator<Item = (K, i64)>,
        K: Into<String>,
    {
        Chunking::Explicit(sizes.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Check that every block size is either `-1` or positive.
    pub fn validate(&self) -> Result<(), ArrayError> {
        if let Chunking::Explicit(sizes) = self {
            for (dim, &size) in sizes {
                if size != WHOLE_AXIS && size <= 0 {
                    return Err(ArrayError::InvalidChunk {
                        dim: dim.clone(),
                        size,
                    });
                }
            }
        }
        Ok(())
    }

    /// Describe the chunking per dimension of an array, for reporting.
    ///
    /// Dimensions that an explicit chunking leaves out span the whole axis.
    pub fn descriptor(&self, dims: &[String]) -> ChunkDescriptor {
        match self {
            Chunking::Auto => ChunkDescriptor::Auto,
            Chunking::Explicit(sizes) => ChunkDescriptor::PerDim(
                dims.iter()
                    .map(|d| sizes.get(d).copied().unwrap_or(WHOLE_AXIS))
                    .collect(),
            ),
        }
    }

    /// Resolve the chunking into concrete block sizes for each axis.
    pub fn normalize(
        &self,
        dims: &[String],
        shape: &[usize],
    ) -> Result<Vec<Vec<usize>>, ArrayError> {
        if dims.len() != shape.len() {
            return Err(ArrayError::ShapeMismatch(format!(
                "{} dimension names for a {}-d shape",
                dims.len(),
                shape.len()
            )));
        }
        if shape_nbytes(shape).is_none() {
            return Err(ArrayError::ShapeMismatch(format!(
                "shape {:?} overflows the address space",
                shape
            )));
        }
        self.validate()?;

        let blocks = match self {
            Chunking::Auto => auto_blocks(shape),
            Chunking::Explicit(sizes) => {
                if let Some(unknown) = sizes.keys().find(|k| !dims.contains(k)) {
                    return Err(ArrayError::UnknownDimension(unknown.clone()));
                }
                dims.iter()
                    .zip(shape)
                    .map(|(dim, &len)| match sizes.get(dim) {
                        Some(&size) if size != WHOLE_AXIS => size as usize,
                        _ => len,
                    })
                    .collect()
            }
        };

        Ok(shape
            .iter()
            .zip(blocks)
            .map(|(&len, block)| split_axis(len, block))
            .collect())
    }
}

fn auto_blocks(shape: &[usize]) -> Vec<usize> {
    let mut block = shape.to_vec();
    while block.iter().product::<usize>() * ITEMSIZE > AUTO_CHUNK_BYTES {
        let Some((axis, &size)) = block.iter().enumerate().max_by_key(|(_, b)| **b) else {
            break;
        };
        if size <= 1 {
            break;
        }
        block[axis] = size.div_ceil(2);
    }
    block
}

/// Split an axis of length `len` into blocks of at most `block` elements.
pub(crate) fn split_axis(len: usize, block: usize) -> Vec<usize> {
    if len == 0 || block == 0 {
        return vec![len];
    }
    let mut sizes = vec![block; len / block];
    if len % block != 0 {
        sizes.push(len % block);
    }
    sizes
}

/// Chunking as reported in result records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkDescriptor {
    /// The runtime chose the blocks.
    Auto,
    /// Block size per dimension, in array dimension order.
    PerDim(Vec<i64>),
}

impl fmt::Display for ChunkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkDescriptor::Auto => write!(f, "auto"),
            ChunkDescriptor::PerDim(sizes) => {
                let parts: Vec<_> = sizes.iter().map(|s| s.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl Serialize for ChunkDescriptor {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            ChunkDescriptor::Auto => s.serialize_str("auto"),
            ChunkDescriptor::PerDim(sizes) => sizes.serialize(s),
        }
    }
}
