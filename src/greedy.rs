//! First-Fit and Best-Fit Decreasing bin packing.
//!
//! The packer is used on its own, as the baseline the other solvers are compared to, as the
//! upper bound that seeds branch-and-bound, and as the starting point of the swap optimizer.

use crate::bin::WorkBin;
use crate::config::SolverConfig;
use crate::error::Result;
use crate::offcut::{available_offcuts, OffcutPiece};
use crate::progress::{Progress, ProgressSink};
use crate::request::{check_segments, Segment};
use crate::result::{SearchStats, SolveResult, SolveStatus};
use std::cmp;
use std::time::Instant;
use tracing::{debug, instrument};

/// Name reported by the greedy packer.
pub const GREEDY: &str = "greedy";

/// How the packer picks a bin among those a segment fits in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FitRule {
    /// The bin left with the least remaining capacity.
    #[default]
    BestFit,
    /// The first bin, in opening order, then the first offcut, in input order.
    FirstFit,
}

impl FitRule {
    fn method(self) -> &'static str {
        match self {
            FitRule::BestFit => "best_fit_decreasing",
            FitRule::FirstFit => "first_fit_decreasing",
        }
    }
}

/// Where a segment goes next.
enum Destination {
    Open(usize),
    Offcut(usize),
    NewBar,
}

/// Segment positions sorted by effective length, longest first. Equal lengths keep input order.
pub(crate) fn decreasing_order(segments: &[Segment]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..segments.len()).collect();
    order.sort_by(|&a, &b| {
        segments[b]
            .effective_length
            .partial_cmp(&segments[a].effective_length)
            .unwrap_or(cmp::Ordering::Equal)
    });
    order
}

/// Packs `segments` longest first. Offcuts are opened on demand, and a new standard bar is only
/// opened when no open bin and no unopened offcut can take the segment.
pub(crate) fn pack_decreasing<'a>(
    segments: &'a [Segment],
    offcuts: &[&OffcutPiece],
    rule: FitRule,
    config: &SolverConfig,
) -> Vec<WorkBin<'a>> {
    let mut bins: Vec<WorkBin<'a>> = Vec::new();
    let mut unopened: Vec<Option<WorkBin<'a>>> = offcuts
        .iter()
        .map(|offcut| Some(WorkBin::from_offcut(offcut)))
        .collect();

    for index in decreasing_order(segments) {
        let segment = &segments[index];
        let destination = choose(&bins, &unopened, segment, rule, config);

        match destination {
            Destination::Open(i) => bins[i].push(segment),
            Destination::Offcut(i) => {
                if let Some(mut bin) = unopened[i].take() {
                    bin.push(segment);
                    bins.push(bin);
                }
            }
            Destination::NewBar => {
                let mut bin = WorkBin::new_bar(config.standard_length);
                bin.push(segment);
                bins.push(bin);
            }
        }
    }

    bins
}

fn choose(
    bins: &[WorkBin<'_>],
    unopened: &[Option<WorkBin<'_>>],
    segment: &Segment,
    rule: FitRule,
    config: &SolverConfig,
) -> Destination {
    let open = bins
        .iter()
        .enumerate()
        .filter(|(_, bin)| bin.can_accept(segment, config))
        .map(|(i, bin)| (Destination::Open(i), bin.remaining()));
    let offcuts = unopened
        .iter()
        .enumerate()
        .filter_map(|(i, bin)| bin.as_ref().map(|bin| (i, bin)))
        .filter(|(_, bin)| bin.can_accept(segment, config))
        .map(|(i, bin)| (Destination::Offcut(i), bin.remaining()));
    let mut candidates = open.chain(offcuts);

    let chosen = match rule {
        FitRule::FirstFit => candidates.next(),
        FitRule::BestFit => candidates.fold(None, |best, (destination, remaining)| {
            let after = remaining - segment.cutting_length;
            match best {
                Some((_, best_after)) if best_after <= after => best,
                _ => Some((destination, after)),
            }
        }),
    };

    chosen.map_or(Destination::NewBar, |(destination, _)| destination)
}

/// Packs `segments` with Best-Fit Decreasing.
pub fn solve_greedy<P>(
    segments: &[Segment],
    diameter: u32,
    offcuts: &[OffcutPiece],
    config: &SolverConfig,
    progress: &P,
) -> Result<SolveResult>
where
    P: ProgressSink + ?Sized,
{
    solve_greedy_with_rule(segments, diameter, offcuts, FitRule::BestFit, config, progress)
}

/// Packs `segments` with the given fit rule.
#[instrument(skip_all, fields(diameter = diameter, segments = segments.len(), rule = ?rule))]
pub fn solve_greedy_with_rule<P>(
    segments: &[Segment],
    diameter: u32,
    offcuts: &[OffcutPiece],
    rule: FitRule,
    config: &SolverConfig,
    progress: &P,
) -> Result<SolveResult>
where
    P: ProgressSink + ?Sized,
{
    check_segments(segments, config)?;
    let offcuts = available_offcuts(offcuts, diameter)?;
    if segments.is_empty() {
        return Ok(SolveResult::empty(GREEDY, diameter));
    }

    let start = Instant::now();
    progress.report(&Progress::new(GREEDY, "pack", 0.0));

    let bins = pack_decreasing(segments, &offcuts, rule, config);

    let stats = SearchStats {
        elapsed: start.elapsed(),
        ..Default::default()
    };
    let result = SolveResult::from_bins(
        GREEDY,
        rule.method(),
        diameter,
        SolveStatus::Heuristic,
        bins,
        stats,
    );

    progress.report(
        &Progress::new(GREEDY, "done", 1.0)
            .with_solution(result.total_bars_used, result.total_waste),
    );
    debug!(
        bars = result.total_bars_used,
        waste = result.total_waste,
        offcuts = result.summary.offcuts_used,
        "greedy packing finished"
    );

    Ok(result)
}
