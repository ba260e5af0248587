//! rebar-cut-optimizer plans how to cut reinforcing bar from standard-length stock bars and
//! leftover offcuts with as few new bars and as little waste as possible.
//!
//! Requests longer than a standard bar are split into lapped segments that may never share a
//! bar. The segments are then packed by one of four solvers: a greedy packer, exact dynamic
//! programming (column generation on large inputs), exact branch-and-bound, and an offcut-aware
//! local search. An adaptive selector picks between them from the size and spread of the input.
//!
//! ```
//! use rebar_cut_optimizer::*;
//!
//! let results = Optimizer::new()
//!     .add_request(CuttingRequest::new("column", 25.0, 2).with_lap(0.3))
//!     .add_request(CuttingRequest::new("stirrup", 1.6, 10))
//!     .add_offcut(OffcutPiece::new("stock-7", 3.2))
//!     .optimize(NoProgress)
//!     .unwrap();
//!
//! assert_eq!(results.len(), 1);
//! assert_eq!(results[0].summary.total_segments, 16);
//! ```

#![deny(missing_docs)]

mod bin;
mod branch_bound;
mod cache;
mod column_generation;
mod config;
mod dp;
mod error;
mod greedy;
mod offcut;
mod pattern;
mod progress;
mod request;
mod result;
mod selector;
mod swap;

#[cfg(test)]
mod tests;

pub use branch_bound::{solve_branch_and_bound, BRANCH_AND_BOUND};
pub use config::{SolverConfig, DEFAULT_STANDARD_LENGTH};
pub use dp::{solve_dp, DYNAMIC_PROGRAMMING};
pub use error::{Error, Result};
pub use greedy::{solve_greedy, solve_greedy_with_rule, FitRule, GREEDY};
pub use offcut::{OffcutPiece, OffcutStatus};
pub use progress::{CancelToken, NoProgress, Progress, ProgressSink};
pub use request::{derive_segments, CuttingRequest, Segment, SubBarPlan};
pub use result::{
    BarOrigin, CuttingPattern, PatternCut, PlacedSegment, Remnant, SearchStats, SolveResult,
    SolveStatus, SolveSummary,
};
pub use selector::{
    rank_results, select_algorithm, solve_adaptive, solve_with, Algorithm, AlgorithmSelection,
};
pub use swap::{solve_swap, SWAP};

use progress::ScaledProgress;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, instrument};

/// Segments of one diameter, ready to be solved.
struct Group {
    diameter: u32,
    segments: Vec<Segment>,
}

/// Optimizer for cutting rebar requests from standard bars and offcuts.
///
/// Requests are solved per diameter, in ascending diameter order. Offcuts are shared between
/// diameters: an offcut consumed for one diameter is no longer offered to the next.
#[derive(Clone, Debug, Default)]
pub struct Optimizer {
    requests: Vec<CuttingRequest>,
    offcuts: Vec<OffcutPiece>,
    config: SolverConfig,
}

impl Optimizer {
    /// Create a new optimizer with the default configuration.
    pub fn new() -> Self {
        Default::default()
    }

    /// Add a request for pieces to cut.
    pub fn add_request(&mut self, request: CuttingRequest) -> &mut Self {
        self.requests.push(request);
        self
    }

    /// Add requests for pieces to cut.
    pub fn add_requests<I>(&mut self, requests: I) -> &mut Self
    where
        I: IntoIterator<Item = CuttingRequest>,
    {
        self.requests.extend(requests);
        self
    }

    /// Add an offcut that may be cut from before opening new bars.
    pub fn add_offcut(&mut self, offcut: OffcutPiece) -> &mut Self {
        self.offcuts.push(offcut);
        self
    }

    /// Add offcuts that may be cut from before opening new bars.
    pub fn add_offcuts<I>(&mut self, offcuts: I) -> &mut Self
    where
        I: IntoIterator<Item = OffcutPiece>,
    {
        self.offcuts.extend(offcuts);
        self
    }

    /// Set the length of a standard bar.
    pub fn set_standard_length(&mut self, length: f64) -> &mut Self {
        self.config.standard_length = length;
        self
    }

    /// Set the slack allowed when testing whether a segment fits.
    pub fn set_fit_tolerance(&mut self, tolerance: f64) -> &mut Self {
        self.config.fit_tolerance = tolerance.max(0.0);
        self
    }

    /// Set the wall-clock budget of branch-and-bound. Results may then depend on machine speed.
    pub fn set_time_limit(&mut self, limit: Duration) -> &mut Self {
        self.config.time_limit = Some(limit);
        self
    }

    /// Set a token that can stop running solvers early.
    pub fn set_cancel_token(&mut self, token: CancelToken) -> &mut Self {
        self.config.cancel = Some(token);
        self
    }

    /// Replace the whole solver configuration.
    pub fn set_config(&mut self, config: SolverConfig) -> &mut Self {
        self.config = config;
        self
    }

    /// The solver configuration in effect.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Leftovers of `result` long enough to keep as offcuts.
    pub fn remnants(&self, result: &SolveResult) -> Vec<Remnant> {
        result.remnants(self.config.min_reusable_length)
    }

    /// Solves every diameter with the adaptively selected solvers and returns the best result
    /// per diameter.
    pub fn optimize<P>(&self, progress: P) -> Result<Vec<SolveResult>>
    where
        P: ProgressSink,
    {
        self.run(&progress, |group, offcuts, sink| {
            solve_adaptive(&group.segments, group.diameter, offcuts, &self.config, sink)
        })
    }

    /// Solves every diameter with one solver.
    pub fn optimize_with<P>(&self, algorithm: Algorithm, progress: P) -> Result<Vec<SolveResult>>
    where
        P: ProgressSink,
    {
        self.run(&progress, |group, offcuts, sink| {
            solve_with(
                algorithm,
                &group.segments,
                group.diameter,
                offcuts,
                &self.config,
                sink,
            )
        })
    }

    /// Solves every diameter with the greedy packer and the selected primary solver running
    /// side by side, and returns both results per diameter, best first.
    ///
    /// The first result of each diameter decides which offcuts later diameters may still use.
    pub fn optimize_concurrently<P>(&self, progress: P) -> Result<Vec<Vec<SolveResult>>>
    where
        P: ProgressSink + Sync,
    {
        let mut ranked = Vec::new();
        self.run(&progress, |group, offcuts, sink| {
            let selection = select_algorithm(&group.segments, offcuts, &self.config);
            let mut results = if selection.primary == Algorithm::Greedy {
                vec![solve_greedy(
                    &group.segments,
                    group.diameter,
                    offcuts,
                    &self.config,
                    sink,
                )?]
            } else {
                let (greedy, primary) = rayon::join(
                    || solve_greedy(&group.segments, group.diameter, offcuts, &self.config, sink),
                    || {
                        solve_with(
                            selection.primary,
                            &group.segments,
                            group.diameter,
                            offcuts,
                            &self.config,
                            sink,
                        )
                    },
                );
                vec![greedy?, primary?]
            };
            rank_results(&mut results);
            let best = results[0].clone();
            ranked.push(results);
            Ok(best)
        })?;
        Ok(ranked)
    }

    /// Derives segments for every diameter before solving anything, so invalid input fails
    /// before any search starts.
    fn groups(&self) -> Result<Vec<Group>> {
        self.config.validate()?;
        for offcut in &self.offcuts {
            offcut.validate()?;
        }

        let mut by_diameter: BTreeMap<u32, Vec<CuttingRequest>> = BTreeMap::new();
        for request in &self.requests {
            by_diameter
                .entry(request.diameter)
                .or_default()
                .push(request.clone());
        }

        by_diameter
            .into_iter()
            .map(|(diameter, requests)| {
                Ok(Group {
                    diameter,
                    segments: derive_segments(&requests, &self.config)?,
                })
            })
            .collect()
    }

    #[instrument(skip_all, fields(requests = self.requests.len(), offcuts = self.offcuts.len()))]
    fn run<P, F>(&self, progress: &P, mut solve: F) -> Result<Vec<SolveResult>>
    where
        P: ProgressSink + ?Sized,
        F: FnMut(&Group, &[OffcutPiece], &ScaledProgress<'_, P>) -> Result<SolveResult>,
    {
        let groups = self.groups()?;
        let mut inventory = self.offcuts.clone();
        let mut results = Vec::with_capacity(groups.len());

        for (i, group) in groups.iter().enumerate() {
            let sink = ScaledProgress::new(progress, i, groups.len());
            let result = solve(group, &inventory, &sink)?;

            for consumed in &result.summary.consumed_offcuts {
                if let Some(offcut) = inventory.iter_mut().find(|o| &o.id == consumed) {
                    offcut.status = OffcutStatus::Used;
                }
            }
            info!(
                diameter = group.diameter,
                algorithm = %result.algorithm_name,
                method = %result.method,
                bars = result.total_bars_used,
                waste = result.total_waste,
                "solved diameter"
            );
            results.push(result);
        }

        Ok(results)
    }
}
