//! Multi-phase local search that refines an offcut-aware Best-Fit Decreasing packing.
//!
//! Each pass runs three phases in a fixed order:
//!
//! 1. **Relocation** moves single segments to the bin that scores best, chiefly to empty bins.
//! 2. **Consolidation** tries to empty whole bins, sparsest first, and reverts when it cannot.
//! 3. **Exchange** swaps two segments between a pair of bins when that makes the pair more
//!    lopsided, which sets up later consolidation.
//!
//! Passes repeat until one fails to reduce the number of standard bars. Bins, segments and
//! candidates are always visited in index order, so identical input gives identical output.

mod manager;
mod scoring;

use crate::bin::WorkBin;
use crate::config::SolverConfig;
use crate::error::Result;
use crate::greedy::{pack_decreasing, FitRule};
use crate::offcut::{available_offcuts, OffcutPiece};
use crate::progress::{Progress, ProgressSink};
use crate::request::{check_segments, Segment};
use crate::result::{SearchStats, SolveResult, SolveStatus};
use manager::{compare_state, BinManager, Target};
use scoring::{move_score, pair_fitness, MoveEffect, PERFECTLY_PACKED};
use std::cmp::Ordering;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Name reported by the swap optimizer.
pub const SWAP: &str = "swap";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Relocate,
    Consolidate,
    Exchange,
}

impl Phase {
    const ALL: [Phase; 3] = [Phase::Relocate, Phase::Consolidate, Phase::Exchange];

    fn stage(self) -> &'static str {
        match self {
            Phase::Relocate => "relocate",
            Phase::Consolidate => "consolidate",
            Phase::Exchange => "exchange",
        }
    }

    fn run(self, manager: &mut BinManager<'_>, config: &SolverConfig) -> usize {
        match self {
            Phase::Relocate => relocate(manager, config),
            Phase::Consolidate => consolidate(manager, config),
            Phase::Exchange => exchange(manager, config),
        }
    }
}

/// Packs `segments` with offcut-aware Best-Fit Decreasing and refines the packing by local
/// search.
///
/// Offcuts available for `diameter` are eligible alongside new bars. A cancellation is honoured
/// at pass and phase boundaries and returns the current packing with
/// [`SolveStatus::BudgetExhausted`].
#[instrument(
    skip_all,
    fields(diameter = diameter, segments = segments.len(), offcuts = offcuts.len())
)]
pub fn solve_swap<P>(
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
    let offcuts = available_offcuts(offcuts, diameter)?;
    if segments.is_empty() {
        return Ok(SolveResult::empty(SWAP, diameter));
    }

    let start = Instant::now();
    let initial = pack_decreasing(segments, &offcuts, FitRule::BestFit, config);
    let mut manager = BinManager::from_packing(initial, &offcuts);
    progress.report(
        &Progress::new(SWAP, "initial", 0.0)
            .with_solution(manager.bar_count(), manager.total_waste()),
    );
    debug!(
        bars = manager.bar_count(),
        waste = manager.total_waste(),
        spares = manager.spares().len(),
        "initial packing"
    );

    let total_phases = (config.swap_max_passes * Phase::ALL.len()).max(1);
    let mut passes = 0;
    let mut moves = 0;
    let mut cancelled = false;

    'passes: for pass in 0..config.swap_max_passes {
        let bars_before = manager.bar_count();
        passes += 1;

        for (index, phase) in Phase::ALL.into_iter().enumerate() {
            if config.is_cancelled() {
                cancelled = true;
                break 'passes;
            }
            moves += phase.run(&mut manager, config);
            manager.drop_empty();

            let done = pass * Phase::ALL.len() + index + 1;
            progress.report(
                &Progress::new(SWAP, phase.stage(), done as f64 / total_phases as f64)
                    .with_solution(manager.bar_count(), manager.total_waste()),
            );
            debug!(
                pass,
                phase = phase.stage(),
                bars = manager.bar_count(),
                waste = manager.total_waste(),
                "phase finished"
            );
        }

        if manager.bar_count() >= bars_before {
            break;
        }
    }

    let status = if cancelled {
        SolveStatus::BudgetExhausted
    } else {
        SolveStatus::Heuristic
    };
    let stats = SearchStats {
        nodes_explored: moves,
        iterations: passes,
        lower_bound: None,
        elapsed: start.elapsed(),
    };
    let result = SolveResult::from_bins(
        SWAP,
        "local_search",
        diameter,
        status,
        manager.into_bins(),
        stats,
    );

    progress.report(
        &Progress::new(SWAP, "done", 1.0)
            .with_solution(result.total_bars_used, result.total_waste),
    );
    info!(
        bars = result.total_bars_used,
        waste = result.total_waste,
        offcuts = result.summary.offcuts_used,
        passes,
        moves,
        "swap optimization finished"
    );
    Ok(result)
}

/// Relocation phase. Returns the number of moves made.
fn relocate(manager: &mut BinManager<'_>, config: &SolverConfig) -> usize {
    if !manager.has_single_segment_bins() {
        return 0;
    }

    let order: Vec<&Segment> = manager
        .by_segment_count()
        .into_iter()
        .flat_map(|i| {
            manager
                .bin(i)
                .segments()
                .map(|used| used.segment)
                .collect::<Vec<_>>()
        })
        .collect();

    let mut best_state = (manager.bar_count(), manager.total_waste());
    let mut stall = 0;
    let mut moves = 0;

    for segment in order {
        if !manager.has_single_segment_bins() {
            break;
        }
        let Some(from) = manager.locate(segment.segment_id) else {
            continue;
        };

        if let Some(target) = best_move(manager, segment, from, config) {
            manager.relocate(segment.segment_id, from, target);
            moves += 1;
        }

        let state = (manager.bar_count(), manager.total_waste());
        if compare_state(state, best_state, config.epsilon) == Ordering::Less {
            best_state = state;
            stall = 0;
        } else {
            stall += 1;
            if stall >= config.swap_stall_limit {
                debug!(stall, "relocation stalled");
                break;
            }
        }
    }
    moves
}

/// Highest scoring target for `segment`, if any scores above zero. Earlier targets win ties.
fn best_move(
    manager: &BinManager<'_>,
    segment: &Segment,
    from: usize,
    config: &SolverConfig,
) -> Option<Target> {
    let source = manager.bin(from);
    let mut best: Option<(Target, f64)> = None;

    for target in manager.targets_for(segment, from, true, config) {
        // Trading one offcut for another frees nothing.
        let swaps_offcuts = source.is_offcut() && matches!(target, Target::Spare(_));
        let (before, after, utilization) = manager.after_insert(target, segment);
        let score = move_score(&MoveEffect {
            empties_source: source.len() == 1 && !swaps_offcuts,
            source_utilization: source.utilization(),
            target_utilization: utilization,
            target_remaining_before: before,
            target_remaining_after: after,
        });
        if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((target, score));
        }
    }
    best.map(|(target, _)| target)
}

/// Consolidation phase. Returns the number of segments moved out of emptied bins.
fn consolidate(manager: &mut BinManager<'_>, config: &SolverConfig) -> usize {
    let mut moves = 0;
    for index in manager.by_segment_count() {
        let source = manager.bin(index);
        if source.is_empty() {
            continue;
        }
        let mut contents: Vec<&Segment> = source.segments().map(|used| used.segment).collect();
        contents.sort_by(|a, b| {
            b.cutting_length
                .partial_cmp(&a.cutting_length)
                .unwrap_or(Ordering::Equal)
        });

        let snapshot = manager.snapshot();
        let placed_all = contents.iter().all(|segment| {
            match manager.best_fit(segment, index, config) {
                Some(target) => manager.relocate(segment.segment_id, index, target).is_some(),
                None => false,
            }
        });

        if placed_all {
            debug!(bin = index, segments = contents.len(), "emptied bin");
            moves += contents.len();
        } else {
            manager.restore(snapshot);
        }
    }
    moves
}

/// Exchange phase. Returns the number of swaps made.
fn exchange(manager: &mut BinManager<'_>, config: &SolverConfig) -> usize {
    let mut swaps = 0;
    let count = manager.bins().len();
    for i in 0..count {
        for j in (i + 1)..count {
            let (first, second) = (manager.bin(i), manager.bin(j));
            if first.is_empty()
                || second.is_empty()
                || first.utilization() >= PERFECTLY_PACKED
                || second.utilization() >= PERFECTLY_PACKED
            {
                continue;
            }
            if let Some((a, b)) = find_exchange(first, second, config) {
                manager.exchange((i, a), (j, b));
                swaps += 1;
            }
        }
    }
    swaps
}

/// First pair of segments whose swap keeps both bins feasible and raises the pair's summed
/// squared utilization.
fn find_exchange(
    first: &WorkBin<'_>,
    second: &WorkBin<'_>,
    config: &SolverConfig,
) -> Option<(usize, usize)> {
    let before = pair_fitness(first.utilization(), second.utilization());

    for a in first.segments().map(|used| used.segment) {
        for b in second.segments().map(|used| used.segment) {
            let delta = b.cutting_length - a.cutting_length;
            if delta.abs() <= config.epsilon {
                continue;
            }
            if !config.fits(delta, first.remaining()) || !config.fits(-delta, second.remaining()) {
                continue;
            }
            let blocks = |bin: &WorkBin<'_>, leaving: &Segment, entering: &Segment| {
                bin.segments().any(|used| {
                    used.segment.segment_id != leaving.segment_id
                        && used.segment.conflicts_with(entering)
                })
            };
            if blocks(first, a, b) || blocks(second, b, a) {
                continue;
            }

            let first_after = ((first.used() + delta) / first.capacity()).min(1.0);
            let second_after = ((second.used() - delta) / second.capacity()).min(1.0);
            if pair_fitness(first_after, second_after) > before + 1e-12 {
                return Some((a.segment_id, b.segment_id));
            }
        }
    }
    None
}
