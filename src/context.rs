//! Phase timing for a single benchmark repeat.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::result::OperationTiming;

/// The three timed phases of a repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Loading the source.
    Open,
    /// Building the operation's output.
    Run,
    /// Materializing the output.
    Save,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Open => "open",
            Phase::Run => "run",
            Phase::Save => "save",
        })
    }
}

/// Timing state of one repeat.
///
/// The total is its own span from [`start`](Self::start) to
/// [`finish`](Self::finish), so it also covers the gaps between phases.
pub struct RepeatContext {
    date: DateTime<Local>,
    started: Instant,
    open: Duration,
    run: Duration,
    save: Duration,
}

impl RepeatContext {
    /// Stamp the wall-clock date and start the total span.
    pub fn start() -> Self {
        Self {
            date: Local::now(),
            started: Instant::now(),
            open: Duration::ZERO,
            run: Duration::ZERO,
            save: Duration::ZERO,
        }
    }

    /// Time `f` as `phase`. Measuring a phase twice keeps the later value.
    pub fn measure<F, R>(&mut self, phase: Phase, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        match phase {
            Phase::Open => self.open = elapsed,
            Phase::Run => self.run = elapsed,
            Phase::Save => self.save = elapsed,
        }
        result
    }

    /// Close the total span.
    pub fn finish(self, op_type: impl Into<String>) -> OperationTiming {
        let time_total = self.started.elapsed();
        OperationTiming {
            op_type: op_type.into(),
            date: self.date,
            time_open: self.open,
            time_run: self.run,
            time_save: self.save,
            time_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_measure_each_phase_when_called() {
        let mut ctx = RepeatContext::start();
        ctx.measure(Phase::Open, || std::thread::sleep(Duration::from_millis(5)));
        let out = ctx.measure(Phase::Run, || 7);
        ctx.measure(Phase::Save, || std::thread::sleep(Duration::from_millis(10)));
        let timing = ctx.finish("TimeMean");

        assert_eq!(out, 7);
        assert_eq!(timing.op_type, "TimeMean");
        assert!(timing.time_open >= Duration::from_millis(5));
        assert!(timing.time_save >= Duration::from_millis(10));
        assert!(timing.time_save < Duration::from_millis(500));
    }

    #[test]
    fn should_cover_phases_with_total() {
        let mut ctx = RepeatContext::start();
        ctx.measure(Phase::Open, || std::thread::sleep(Duration::from_millis(2)));
        std::thread::sleep(Duration::from_millis(3));
        ctx.measure(Phase::Run, || std::thread::sleep(Duration::from_millis(2)));
        let timing = ctx.finish("x");

        assert!(timing.time_total >= timing.phase_sum());
        assert!(timing.time_total >= Duration::from_millis(7));
    }

    #[test]
    fn should_leave_unmeasured_phase_zero() {
        let timing = RepeatContext::start().finish("x");
        assert_eq!(timing.time_run, Duration::ZERO);
    }

    #[test]
    fn should_stamp_date_at_start() {
        let before = Local::now();
        let ctx = RepeatContext::start();
        std::thread::sleep(Duration::from_millis(2));
        let timing = ctx.finish("x");
        assert!(timing.date >= before);
        assert!(timing.date <= Local::now());
    }
}
