//! The benchmark loop.
//!
//! For each source: read its info, warm it up, then time every compatible
//! operation `repeats` times. Results stream out of [`BenchmarkRun`] as they
//! are measured. The first error ends the run.

use std::iter::FusedIterator;

use tracing::{debug, info};

use crate::context::{Phase, RepeatContext};
use crate::error::Result;
use crate::operation::Operation;
use crate::result::{OperationTiming, SourceInfo};
use crate::source::Source;

/// Time one open, run and save cycle of `op` against `source`.
pub fn measure_repeat(source: &dyn Source, op: &dyn Operation) -> Result<OperationTiming> {
    let mut ctx = RepeatContext::start();
    let array = ctx.measure(Phase::Open, || source.load())?;
    let output = ctx.measure(Phase::Run, || op.run(&array))?;
    ctx.measure(Phase::Save, || op.save(&output))?;
    Ok(ctx.finish(op.identity()))
}

/// Benchmark `operations` against every source in turn.
///
/// Nothing runs until the returned iterator is advanced.
pub fn benchmark<I>(
    sources: I,
    operations: &[Box<dyn Operation>],
    repeats: usize,
) -> BenchmarkRun<'_, I::IntoIter>
where
    I: IntoIterator<Item = Result<Box<dyn Source>>>,
{
    BenchmarkRun {
        sources: sources.into_iter(),
        operations,
        repeats,
        state: State::Idle,
    }
}

enum State {
    /// Between sources.
    Idle,
    /// A warmed-up source, positioned at the next repeat to time.
    Active {
        source: Box<dyn Source>,
        info: SourceInfo,
        op_index: usize,
        repeat: usize,
    },
    Done,
}

/// Single-pass stream of `(source info, timing)` pairs.
///
/// Yields one item per (source, compatible operation, repeat). After the
/// first error it yields nothing more.
pub struct BenchmarkRun<'a, I> {
    sources: I,
    operations: &'a [Box<dyn Operation>],
    repeats: usize,
    state: State,
}

impl<I> BenchmarkRun<'_, I>
where
    I: Iterator<Item = Result<Box<dyn Source>>>,
{
    fn prepare(source: Box<dyn Source>) -> Result<State> {
        info!(source = source.name(), kind = source.type_name(), "benchmarking source");
        let info = source.info()?;
        debug!(source = source.name(), nbytes = info.nbytes, "warming up");
        source.warmup()?;
        Ok(State::Active {
            source,
            info,
            op_index: 0,
            repeat: 0,
        })
    }

    /// Index of the first operation at or after `from` that `source` accepts.
    fn next_compatible(&self, source: &dyn Source, from: usize) -> Option<usize> {
        if self.repeats == 0 {
            return None;
        }
        (from..self.operations.len())
            .find(|&i| source.is_compatible_with(self.operations[i].identity()))
    }
}

impl<I> Iterator for BenchmarkRun<'_, I>
where
    I: Iterator<Item = Result<Box<dyn Source>>>,
{
    type Item = Result<(SourceInfo, OperationTiming)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::Done => return None,
                State::Idle => {
                    let prepared = self.sources.next()?.and_then(Self::prepare);
                    match prepared {
                        Ok(state) => self.state = state,
                        Err(e) => return Some(Err(e)),
                    }
                }
                State::Active {
                    source,
                    info,
                    op_index,
                    repeat,
                } => {
                    let Some(op_index) = self.next_compatible(source.as_ref(), op_index) else {
                        self.state = State::Idle;
                        continue;
                    };
                    let op = self.operations[op_index].as_ref();
                    let timing = match measure_repeat(source.as_ref(), op) {
                        Ok(timing) => timing,
                        Err(e) => return Some(Err(e)),
                    };
                    debug!(
                        source = source.name(),
                        op = op.identity(),
                        repeat,
                        total = ?timing.time_total,
                        "repeat finished"
                    );

                    let (op_index, repeat) = if repeat + 1 < self.repeats {
                        (op_index, repeat + 1)
                    } else {
                        (op_index + 1, 0)
                    };
                    let item = (info.clone(), timing);
                    self.state = State::Active {
                        source,
                        info,
                        op_index,
                        repeat,
                    };
                    return Some(Ok(item));
                }
            }
        }
    }
}

impl<I> FusedIterator for BenchmarkRun<'_, I> where I: Iterator<Item = Result<Box<dyn Source>>> {}
