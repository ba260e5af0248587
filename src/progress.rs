//! Progress notifications and cooperative cancellation.
//!
//! Solvers never keep global counters. Everything a caller might want to watch while a solve
//! is running is pushed through a [`ProgressSink`] handed to the solver, and everything it
//! wants afterwards is returned in the [`SolveSummary`](crate::SolveSummary).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A single advisory progress notification.
#[derive(Clone, Debug, PartialEq)]
pub struct Progress {
    /// Name of the algorithm that emitted the notification.
    pub algorithm: &'static str,

    /// Stage within the algorithm, e.g. `"relocate"` or `"search"`.
    pub stage: &'static str,

    /// Completion estimate between 0.0 and 1.0.
    pub fraction: f64,

    /// Standard bars in use by the current best solution, if known.
    pub bars: Option<usize>,

    /// Total waste of the current best solution, if known.
    pub waste: Option<f64>,
}

impl Progress {
    pub(crate) fn new(algorithm: &'static str, stage: &'static str, fraction: f64) -> Self {
        Self {
            algorithm,
            stage,
            fraction: fraction.clamp(0.0, 1.0),
            bars: None,
            waste: None,
        }
    }

    pub(crate) fn with_solution(mut self, bars: usize, waste: f64) -> Self {
        self.bars = Some(bars);
        self.waste = Some(waste);
        self
    }

    /// Completion estimate as a percentage.
    pub fn percent(&self) -> f64 {
        self.fraction * 100.0
    }
}

/// Receiver of progress notifications.
///
/// Notifications are advisory. Reporting must not influence the search, so a sink that does
/// nothing yields exactly the same solutions as one that records everything.
pub trait ProgressSink {
    /// Called at the solver's yield points.
    fn report(&self, progress: &Progress);
}

impl<F> ProgressSink for F
where
    F: Fn(&Progress),
{
    fn report(&self, progress: &Progress) {
        self(progress)
    }
}

/// A sink that discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: &Progress) {}
}

/// Maps the progress of one of several consecutive runs onto the range of all runs.
pub(crate) struct ScaledProgress<'a, S: ?Sized> {
    inner: &'a S,
    run: usize,
    runs: usize,
}

impl<'a, S> ScaledProgress<'a, S>
where
    S: ProgressSink + ?Sized,
{
    pub(crate) fn new(inner: &'a S, run: usize, runs: usize) -> Self {
        Self {
            inner,
            run,
            runs: runs.max(1),
        }
    }
}

impl<S> ProgressSink for ScaledProgress<'_, S>
where
    S: ProgressSink + ?Sized,
{
    fn report(&self, progress: &Progress) {
        let mut scaled = progress.clone();
        scaled.fraction = (self.run as f64 + progress.fraction) / self.runs as f64;
        self.inner.report(&scaled);
    }
}

/// Shared flag used to ask running solvers to stop early.
///
/// Solvers poll the token at node expansions, iteration and pass boundaries, and return the
/// best solution found so far once it is set.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Default::default()
    }

    /// Requests cancellation of every solver holding a clone of this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
