//! Picks a solver from the size and spread of an instance and ranks solver results.

use crate::branch_bound::{solve_branch_and_bound, BRANCH_AND_BOUND};
use crate::config::SolverConfig;
use crate::dp::{solve_dp, DYNAMIC_PROGRAMMING};
use crate::error::Result;
use crate::greedy::{solve_greedy, GREEDY};
use crate::offcut::{OffcutPiece, OffcutStatus};
use crate::pattern::SegmentCatalog;
use crate::progress::ProgressSink;
use crate::request::{check_segments, Segment};
use crate::result::SolveResult;
use crate::swap::{solve_swap, SWAP};
use std::cmp::Ordering;
use std::fmt;
use tracing::{debug, instrument};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Coefficient of variation of segment lengths above which local search is preferred over
/// pattern-based solvers.
const HIGH_VARIATION: f64 = 0.5;

/// One of the solvers.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Best-Fit Decreasing.
    Greedy,
    /// Exact dynamic programming, column generation on large instances.
    DynamicProgramming,
    /// Exact branch-and-bound, Best-Fit Decreasing on large instances.
    BranchAndBound,
    /// Offcut-aware local search.
    Swap,
}

impl Algorithm {
    /// Name reported in [`SolveResult::algorithm_name`].
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Greedy => GREEDY,
            Algorithm::DynamicProgramming => DYNAMIC_PROGRAMMING,
            Algorithm::BranchAndBound => BRANCH_AND_BOUND,
            Algorithm::Swap => SWAP,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The solver chosen for an instance, an optional second opinion, and why.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlgorithmSelection {
    /// Solver expected to do best.
    pub primary: Algorithm,

    /// Solver worth running alongside the primary one.
    pub secondary: Option<Algorithm>,

    /// Human readable reason for the choice.
    pub rationale: String,
}

impl AlgorithmSelection {
    fn new(primary: Algorithm, secondary: Option<Algorithm>, rationale: String) -> Self {
        Self {
            primary,
            secondary,
            rationale,
        }
    }

    /// Primary then secondary.
    pub fn algorithms(&self) -> impl Iterator<Item = Algorithm> {
        std::iter::once(self.primary).chain(self.secondary)
    }
}

/// Chooses solvers for `segments`.
///
/// In order of precedence:
///
/// * no segments: greedy;
/// * offcuts in stock: swap, which reasons about them, backed by greedy;
/// * within branch-and-bound thresholds: branch-and-bound, backed by dynamic programming;
/// * within dynamic programming thresholds: dynamic programming, backed by swap;
/// * lengths spread widely: swap, backed by greedy;
/// * otherwise: dynamic programming (column generation), backed by swap.
pub fn select_algorithm(
    segments: &[Segment],
    offcuts: &[OffcutPiece],
    config: &SolverConfig,
) -> AlgorithmSelection {
    use Algorithm::*;

    if segments.is_empty() {
        return AlgorithmSelection::new(Greedy, None, "no segments to place".to_string());
    }

    let catalog = SegmentCatalog::new(segments, config);
    let units = segments.len();
    let types = catalog.type_count();

    let selection = if offcuts
        .iter()
        .any(|offcut| offcut.status == OffcutStatus::Available)
    {
        AlgorithmSelection::new(
            Swap,
            Some(Greedy),
            format!("{} offcuts in stock", offcuts.len()),
        )
    } else if units <= config.bb_max_units && types <= config.bb_max_types {
        AlgorithmSelection::new(
            BranchAndBound,
            Some(DynamicProgramming),
            format!("{units} segments of {types} types fit exact branch-and-bound"),
        )
    } else if units <= config.dp_max_units && types <= config.dp_max_types {
        AlgorithmSelection::new(
            DynamicProgramming,
            Some(Swap),
            format!("{units} segments of {types} types fit exact dynamic programming"),
        )
    } else {
        let variation = variation(segments);
        if variation > HIGH_VARIATION {
            AlgorithmSelection::new(
                Swap,
                Some(Greedy),
                format!("{units} segments with length variation {variation:.2}"),
            )
        } else {
            AlgorithmSelection::new(
                DynamicProgramming,
                Some(Swap),
                format!("{units} segments of {types} types need column generation"),
            )
        }
    };

    debug!(
        primary = %selection.primary,
        secondary = ?selection.secondary,
        rationale = %selection.rationale,
        "selected algorithm"
    );
    selection
}

/// Coefficient of variation of the cutting lengths.
fn variation(segments: &[Segment]) -> f64 {
    let n = segments.len() as f64;
    let mean = segments.iter().map(|s| s.cutting_length).sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = segments
        .iter()
        .map(|s| (s.cutting_length - mean).powi(2))
        .sum::<f64>()
        / n;
    variance.sqrt() / mean
}

/// Runs one solver. Solvers that do not use offcuts ignore them.
pub fn solve_with<P>(
    algorithm: Algorithm,
    segments: &[Segment],
    diameter: u32,
    offcuts: &[OffcutPiece],
    config: &SolverConfig,
    progress: &P,
) -> Result<SolveResult>
where
    P: ProgressSink + ?Sized,
{
    match algorithm {
        Algorithm::Greedy => solve_greedy(segments, diameter, offcuts, config, progress),
        Algorithm::DynamicProgramming => solve_dp(segments, diameter, config, progress),
        Algorithm::BranchAndBound => solve_branch_and_bound(segments, diameter, config, progress),
        Algorithm::Swap => solve_swap(segments, diameter, offcuts, config, progress),
    }
}

/// Runs the selected solvers one after the other and returns the best result.
#[instrument(skip_all, fields(diameter = diameter, segments = segments.len()))]
pub fn solve_adaptive<P>(
    segments: &[Segment],
    diameter: u32,
    offcuts: &[OffcutPiece],
    config: &SolverConfig,
    progress: &P,
) -> Result<SolveResult>
where
    P: ProgressSink + ?Sized,
{
    check_segments(segments, config)?;
    let selection = select_algorithm(segments, offcuts, config);

    let mut results = selection
        .algorithms()
        .map(|algorithm| solve_with(algorithm, segments, diameter, offcuts, config, progress))
        .collect::<Result<Vec<_>>>()?;
    rank_results(&mut results);

    // `algorithms` always yields the primary solver, so there is at least one result.
    Ok(results.swap_remove(0))
}

/// Orders results best first: fewer bars, then less waste, then algorithm name.
pub fn rank_results(results: &mut [SolveResult]) {
    results.sort_by(compare_results);
}

fn compare_results(a: &SolveResult, b: &SolveResult) -> Ordering {
    a.total_bars_used
        .cmp(&b.total_bars_used)
        .then_with(|| {
            a.total_waste
                .partial_cmp(&b.total_waste)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.algorithm_name.cmp(&b.algorithm_name))
}
