//! Depth-first branch-and-bound over type-level patterns.
//!
//! The incumbent starts from Best-Fit Decreasing, so the search only ever has to beat a known
//! bar count. Every node cuts one pattern containing the first outstanding type; a node is
//! pruned once its bars plus the lower bound of what is left cannot beat the incumbent, or when
//! the same demand was already reached with no more bars.

use crate::config::SolverConfig;
use crate::error::Result;
use crate::greedy::{pack_decreasing, FitRule};
use crate::pattern::{
    enumerate_patterns, first_outstanding, greedy_plan, materialize, plan_waste, Demand, Pattern,
    SegmentCatalog,
};
use crate::progress::{Progress, ProgressSink};
use crate::request::{check_segments, Segment};
use crate::result::{SearchStats, SolveResult, SolveStatus};
use fnv::FnvHashMap;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Name reported by the branch-and-bound solver.
pub const BRANCH_AND_BOUND: &str = "branch_and_bound";

const CHECK_EVERY: usize = 256;

struct Node {
    demand: Demand,
    plan: Vec<usize>,
}

struct Incumbent {
    plan: Vec<Pattern>,
    waste: f64,
}

impl Incumbent {
    fn bars(&self) -> usize {
        self.plan.len()
    }
}

/// Solves small instances exactly with branch-and-bound.
///
/// Instances above the configured thresholds are packed with Best-Fit Decreasing instead and
/// reported with the method `"heuristic_fallback"`. When the node limit, the time limit or a
/// cancellation stops the search, the incumbent is returned with
/// [`SolveStatus::BudgetExhausted`].
#[instrument(skip_all, fields(diameter = diameter, segments = segments.len()))]
pub fn solve_branch_and_bound<P>(
    segments: &[Segment],
    diameter: u32,
    config: &SolverConfig,
    progress: &P,
) -> Result<SolveResult>
where
    P: ProgressSink + ?Sized,
{
    check_segments(segments, config)?;
    if segments.is_empty() {
        return Ok(SolveResult::empty(BRANCH_AND_BOUND, diameter));
    }

    let start = Instant::now();
    let catalog = SegmentCatalog::new(segments, config);

    if segments.len() > config.bb_max_units || catalog.type_count() > config.bb_max_types {
        info!(
            units = segments.len(),
            types = catalog.type_count(),
            "instance above branch-and-bound thresholds, packing greedily"
        );
        let bins = pack_decreasing(segments, &[], FitRule::BestFit, config);
        let stats = SearchStats {
            elapsed: start.elapsed(),
            ..Default::default()
        };
        let result = SolveResult::from_bins(
            BRANCH_AND_BOUND,
            "heuristic_fallback",
            diameter,
            SolveStatus::Heuristic,
            bins,
            stats,
        );
        progress.report(
            &Progress::new(BRANCH_AND_BOUND, "done", 1.0)
                .with_solution(result.total_bars_used, result.total_waste),
        );
        return Ok(result);
    }

    let demand = catalog.demand();
    let root_bound = catalog.lower_bound(&demand);
    let seed = greedy_plan(&catalog, config);
    let mut incumbent = Incumbent {
        waste: plan_waste(&seed),
        plan: seed,
    };
    progress.report(
        &Progress::new(BRANCH_AND_BOUND, "seed", 0.0)
            .with_solution(incumbent.bars(), incumbent.waste),
    );

    let set = enumerate_patterns(&catalog, &demand, config);
    let mut containing: Vec<Vec<usize>> = vec![Vec::new(); catalog.type_count()];
    for (index, pattern) in set.patterns.iter().enumerate() {
        for &(t, _) in &pattern.counts {
            containing[t].push(index);
        }
    }

    let deadline = config.deadline(start);
    let mut visited: FnvHashMap<Demand, usize> = Default::default();
    let mut stack = vec![Node {
        demand,
        plan: Vec::new(),
    }];
    let mut nodes = 0;
    let mut exhausted = false;

    while incumbent.bars() > root_bound {
        let Some(node) = stack.pop() else {
            break;
        };
        nodes += 1;
        if nodes > config.bb_node_limit || config.is_cancelled() {
            exhausted = true;
            break;
        }
        if nodes % CHECK_EVERY == 0 {
            if deadline.map_or(false, |d| Instant::now() >= d) {
                exhausted = true;
                break;
            }
            progress.report(
                &Progress::new(
                    BRANCH_AND_BOUND,
                    "search",
                    nodes as f64 / config.bb_node_limit.max(1) as f64,
                )
                .with_solution(incumbent.bars(), incumbent.waste),
            );
        }

        let bars = node.plan.len();
        let Some(first) = first_outstanding(&node.demand) else {
            let plan: Vec<Pattern> = node
                .plan
                .iter()
                .map(|&i| set.patterns[i].clone())
                .collect();
            let waste = plan_waste(&plan);
            if bars < incumbent.bars() {
                debug!(bars, nodes, "improved incumbent");
                incumbent = Incumbent { plan, waste };
            }
            continue;
        };

        if bars + catalog.lower_bound(&node.demand) >= incumbent.bars() {
            continue;
        }
        match visited.get(&node.demand) {
            Some(&seen) if seen <= bars => continue,
            _ => {
                visited.insert(node.demand.clone(), bars);
            }
        }

        // Children go on the stack worst first, so the most efficient pattern is tried next.
        for &index in containing[first].iter().rev() {
            let pattern = &set.patterns[index];
            if !pattern.applies_to(&node.demand) {
                continue;
            }
            let mut demand = node.demand.clone();
            pattern.apply(&mut demand);
            let mut plan = node.plan.clone();
            plan.push(index);
            stack.push(Node { demand, plan });
        }
    }

    let built = materialize(&catalog, &incumbent.plan, config);
    if built.spilled > 0 {
        warn!(spilled = built.spilled, "plan left segments to best-fit placement");
    }
    let proven = incumbent.bars() <= root_bound || (!exhausted && set.complete);
    let status = if proven && built.spilled == 0 {
        SolveStatus::Optimal
    } else if exhausted {
        SolveStatus::BudgetExhausted
    } else {
        SolveStatus::Heuristic
    };

    let bins = built.bins;
    let stats = SearchStats {
        nodes_explored: nodes,
        iterations: 0,
        lower_bound: Some(root_bound),
        elapsed: start.elapsed(),
    };
    let result = SolveResult::from_bins(BRANCH_AND_BOUND, "exact", diameter, status, bins, stats);

    progress.report(
        &Progress::new(BRANCH_AND_BOUND, "done", 1.0)
            .with_solution(result.total_bars_used, result.total_waste),
    );
    info!(
        bars = result.total_bars_used,
        lower_bound = root_bound,
        nodes,
        status = ?result.status,
        "branch-and-bound finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::request::{derive_segments, CuttingRequest};

    fn segments(lengths: &[f64]) -> Vec<Segment> {
        lengths
            .iter()
            .enumerate()
            .map(|(i, &l)| Segment::new(i, format!("R{i}"), l))
            .collect()
    }

    #[test]
    fn beats_greedy_seed() {
        let segments = segments(&[5.0, 5.0, 4.0, 4.0, 3.0, 3.0]);
        let result =
            solve_branch_and_bound(&segments, 16, &SolverConfig::default(), &NoProgress).unwrap();
        assert_eq!(result.total_bars_used, 2);
        assert_eq!(result.status, SolveStatus::Optimal);
        assert!(result.summary.stats.nodes_explored > 0);
    }

    #[test]
    fn seed_at_lower_bound_skips_search() {
        let segments = segments(&[6.0, 6.0, 6.0, 6.0]);
        let result =
            solve_branch_and_bound(&segments, 16, &SolverConfig::default(), &NoProgress).unwrap();
        assert_eq!(result.total_bars_used, 2);
        assert_eq!(result.status, SolveStatus::Optimal);
        assert_eq!(result.summary.stats.nodes_explored, 0);
    }

    #[test]
    fn keeps_split_pieces_on_separate_bars() {
        let config = SolverConfig::default();
        let requests = [
            CuttingRequest::new("R0", 16.4, 3).with_lap(0.4),
            CuttingRequest::new("R1", 14.4, 2).with_lap(0.4),
            CuttingRequest::new("R2", 5.4, 1),
        ];
        let segments = derive_segments(&requests, &config).unwrap();
        let result = solve_branch_and_bound(&segments, 16, &config, &NoProgress).unwrap();

        assert_eq!(result.method, "exact");
        assert_eq!(result.total_bars_used, 8);
        assert_eq!(result.status, SolveStatus::Optimal);
    }

    #[test]
    fn node_limit_keeps_incumbent() {
        let segments = segments(&[5.0, 5.0, 4.0, 4.0, 3.0, 3.0]);
        let config = SolverConfig::default().with_bb_node_limit(1);
        let result = solve_branch_and_bound(&segments, 16, &config, &NoProgress).unwrap();
        assert_eq!(result.status, SolveStatus::BudgetExhausted);
        assert_eq!(result.total_bars_used, 3);
        assert_eq!(result.summary.total_segments, 6);
    }

    #[test]
    fn large_instance_falls_back() {
        let segments = segments(&[1.5; 31]);
        let result =
            solve_branch_and_bound(&segments, 16, &SolverConfig::default(), &NoProgress).unwrap();
        assert_eq!(result.method, "heuristic_fallback");
        assert_eq!(result.status, SolveStatus::Heuristic);
        assert_eq!(result.total_bars_used, 4);
    }

    #[test]
    fn cancelled_search_returns_seed() {
        let token = crate::progress::CancelToken::new();
        token.cancel();
        let config = SolverConfig::default().with_cancel_token(token);
        let segments = segments(&[5.0, 5.0, 4.0, 4.0, 3.0, 3.0]);
        let result = solve_branch_and_bound(&segments, 16, &config, &NoProgress).unwrap();
        assert_eq!(result.status, SolveStatus::BudgetExhausted);
        assert_eq!(result.total_bars_used, 3);
    }
}
