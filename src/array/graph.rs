//! Graph nodes and their block-parallel evaluation.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::{ArrayError, LazyArray, ITEMSIZE};

/// How a grouped mean walks its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStrategy {
    /// For every output group, gather its members from the whole input.
    Gather,
    /// Reduce each input block along the grouped axis to partial sums and
    /// counts, then combine the partials.
    Blocked,
}

/// A slab of one variable stored in an array file.
#[derive(Debug, Clone)]
pub(crate) struct FilePart {
    pub path: PathBuf,
    /// Absolute byte offset of the first element.
    pub offset: u64,
    /// Shape of the slab in this file.
    pub shape: Vec<usize>,
}

#[derive(Debug)]
pub(crate) enum Node {
    Random {
        seed: u64,
    },
    /// Slabs concatenated along `axis`.
    Files {
        parts: Vec<FilePart>,
        axis: usize,
    },
    Mean {
        input: LazyArray,
        axis: usize,
    },
    GroupMean {
        input: LazyArray,
        axis: usize,
        assignment: Arc<[usize]>,
        ngroups: usize,
        strategy: GroupStrategy,
    },
}

/// Evaluate an array to a dense row-major buffer.
pub(crate) fn evaluate(array: &LazyArray) -> Result<Vec<f64>, ArrayError> {
    match array.node.as_ref() {
        Node::Random { seed } => Ok(random_blocks(array, *seed)),
        Node::Files { parts, axis } => read_parts(parts, *axis),
        Node::Mean { input, axis } => {
            let values = evaluate(input)?;
            Ok(mean_axis(&values, input.shape(), *axis))
        }
        Node::GroupMean {
            input,
            axis,
            assignment,
            ngroups,
            strategy,
        } => {
            let values = evaluate(input)?;
            let layout = AxisLayout::new(input.shape(), *axis);
            Ok(match strategy {
                GroupStrategy::Gather => group_gather(&values, layout, assignment, *ngroups),
                GroupStrategy::Blocked => group_blocked(
                    &values,
                    layout,
                    assignment,
                    *ngroups,
                    &input.chunks()[*axis],
                ),
            })
        }
    }
}

pub(crate) fn mean_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.par_iter().sum::<f64>() / values.len() as f64
}

/// Row-major view of a shape split around one axis: `outer x len x inner`.
#[derive(Debug, Clone, Copy)]
struct AxisLayout {
    outer: usize,
    len: usize,
    inner: usize,
}

impl AxisLayout {
    fn new(shape: &[usize], axis: usize) -> Self {
        Self {
            outer: shape[..axis].iter().product(),
            len: shape[axis],
            inner: shape[axis + 1..].iter().product(),
        }
    }

    fn index(&self, o: usize, a: usize, i: usize) -> usize {
        (o * self.len + a) * self.inner + i
    }
}

/// One block of the chunk grid.
struct Block {
    id: u64,
    start: Vec<usize>,
    shape: Vec<usize>,
}

impl Block {
    fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Flat offsets into the full array of every element in this block.
    fn offsets(&self, strides: &[usize]) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.len());
        if self.len() == 0 {
            return out;
        }
        let mut index = vec![0usize; self.shape.len()];
        loop {
            out.push(
                index
                    .iter()
                    .zip(&self.start)
                    .zip(strides)
                    .map(|((i, s), st)| (i + s) * st)
                    .sum(),
            );
            let mut axis = self.shape.len();
            loop {
                if axis == 0 {
                    return out;
                }
                axis -= 1;
                index[axis] += 1;
                if index[axis] < self.shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
    }
}

fn block_grid(chunks: &[Vec<usize>]) -> Vec<Block> {
    let mut blocks = vec![Block {
        id: 0,
        start: Vec::new(),
        shape: Vec::new(),
    }];
    for axis_chunks in chunks {
        let mut next = Vec::with_capacity(blocks.len() * axis_chunks.len());
        for block in &blocks {
            let mut start = 0;
            for &size in axis_chunks {
                let mut b_start = block.start.clone();
                let mut b_shape = block.shape.clone();
                b_start.push(start);
                b_shape.push(size);
                next.push(Block {
                    id: 0,
                    start: b_start,
                    shape: b_shape,
                });
                start += size;
            }
        }
        blocks = next;
    }
    for (id, block) in blocks.iter_mut().enumerate() {
        block.id = id as u64;
    }
    blocks
}

fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

fn random_blocks(array: &LazyArray, seed: u64) -> Vec<f64> {
    let strides = strides(array.shape());
    let filled: Vec<(Vec<usize>, Vec<f64>)> = block_grid(array.chunks())
        .into_par_iter()
        .map(|block| {
            let mixed = seed ^ block.id.wrapping_mul(0x9E37_79B9_7F4A_7C15);
            let mut rng = StdRng::seed_from_u64(mixed);
            let values = (0..block.len()).map(|_| rng.random::<f64>()).collect();
            (block.offsets(&strides), values)
        })
        .collect();

    let mut out = vec![0.0; array.len()];
    for (offsets, values) in filled {
        for (offset, value) in offsets.into_iter().zip(values) {
            out[offset] = value;
        }
    }
    out
}

fn read_part(part: &FilePart) -> Result<Vec<f64>, ArrayError> {
    let count: usize = part.shape.iter().product();
    let mut file = File::open(&part.path)?;
    file.seek(SeekFrom::Start(part.offset))?;
    let mut bytes = vec![0u8; count * ITEMSIZE];
    file.read_exact(&mut bytes).map_err(|e| ArrayError::Format {
        path: part.path.clone(),
        reason: format!("truncated data: {}", e),
    })?;
    Ok(bytes
        .chunks_exact(ITEMSIZE)
        .map(|b| {
            let mut raw = [0u8; ITEMSIZE];
            raw.copy_from_slice(b);
            f64::from_le_bytes(raw)
        })
        .collect())
}

fn read_parts(parts: &[FilePart], axis: usize) -> Result<Vec<f64>, ArrayError> {
    let loaded = parts
        .par_iter()
        .map(read_part)
        .collect::<Result<Vec<_>, _>>()?;

    let layouts: Vec<AxisLayout> = parts.iter().map(|p| AxisLayout::new(&p.shape, axis)).collect();
    let total: usize = loaded.iter().map(Vec::len).sum();
    let outer = layouts.first().map_or(1, |l| l.outer);

    let mut out = Vec::with_capacity(total);
    for o in 0..outer {
        for (values, layout) in loaded.iter().zip(&layouts) {
            let slab = layout.len * layout.inner;
            out.extend_from_slice(&values[o * slab..(o + 1) * slab]);
        }
    }
    Ok(out)
}

fn mean_axis(values: &[f64], shape: &[usize], axis: usize) -> Vec<f64> {
    let layout = AxisLayout::new(shape, axis);
    (0..layout.outer * layout.inner)
        .into_par_iter()
        .map(|idx| {
            let (o, i) = (idx / layout.inner, idx % layout.inner);
            let sum: f64 = (0..layout.len).map(|a| values[layout.index(o, a, i)]).sum();
            sum / layout.len as f64
        })
        .collect()
}

fn group_gather(
    values: &[f64],
    layout: AxisLayout,
    assignment: &[usize],
    ngroups: usize,
) -> Vec<f64> {
    let mut members = vec![Vec::new(); ngroups];
    for (position, &group) in assignment.iter().enumerate() {
        members[group].push(position);
    }
    let out = AxisLayout {
        outer: layout.outer,
        len: ngroups,
        inner: layout.inner,
    };

    (0..out.outer * out.len * out.inner)
        .into_par_iter()
        .map(|idx| {
            let o = idx / (out.len * out.inner);
            let g = (idx / out.inner) % out.len;
            let i = idx % out.inner;
            let group = &members[g];
            let sum: f64 = group.iter().map(|&a| values[layout.index(o, a, i)]).sum();
            sum / group.len() as f64
        })
        .collect()
}

fn group_blocked(
    values: &[f64],
    layout: AxisLayout,
    assignment: &[usize],
    ngroups: usize,
    axis_chunks: &[usize],
) -> Vec<f64> {
    let out = AxisLayout {
        outer: layout.outer,
        len: ngroups,
        inner: layout.inner,
    };
    let size = out.outer * out.len * out.inner;

    let mut spans = Vec::with_capacity(axis_chunks.len());
    let mut start = 0;
    for &len in axis_chunks {
        spans.push(start..start + len);
        start += len;
    }

    let (sums, counts) = spans
        .into_par_iter()
        .map(|span| {
            let mut sums = vec![0.0; size];
            let mut counts = vec![0usize; size];
            for o in 0..layout.outer {
                for a in span.clone() {
                    let g = assignment[a];
                    for i in 0..layout.inner {
                        let target = out.index(o, g, i);
                        sums[target] += values[layout.index(o, a, i)];
                        counts[target] += 1;
                    }
                }
            }
            (sums, counts)
        })
        .reduce(
            || (vec![0.0; size], vec![0usize; size]),
            |(mut sa, mut ca), (sb, cb)| {
                for (a, b) in sa.iter_mut().zip(sb) {
                    *a += b;
                }
                for (a, b) in ca.iter_mut().zip(cb) {
                    *a += b;
                }
                (sa, ca)
            },
        );

    sums.into_iter()
        .zip(counts)
        .map(|(s, c)| s / c as f64)
        .collect()
}
