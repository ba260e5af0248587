//! Exact dynamic programming over the remaining demand.
//!
//! A state is the vector of outstanding counts per segment type. The cost of a state is the
//! lexicographic minimum of (bars, waste) over every pattern that can be cut next, with the
//! utilization of that pattern as a final tie-break. Only patterns containing the first
//! outstanding type are tried: that segment has to go on some bar, and the order of bars does
//! not matter, so this prunes permutations without losing optimality.
//!
//! Instances above the configured size thresholds are handed to the column generation heuristic
//! under the same algorithm name, and so are instances that run out of expansion budget.

use crate::cache::BoundedCache;
use crate::column_generation::column_generation;
use crate::config::SolverConfig;
use crate::error::Result;
use crate::pattern::{
    enumerate_patterns, first_outstanding, materialize, Demand, Pattern, SegmentCatalog,
};
use crate::progress::{Progress, ProgressSink};
use crate::request::{check_segments, Segment};
use crate::result::{SearchStats, SolveResult, SolveStatus};
use std::cmp::Ordering;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Name reported by the dynamic programming solver.
pub const DYNAMIC_PROGRAMMING: &str = "dynamic_programming";

const REPORT_EVERY: usize = 10_000;

#[derive(Clone, Copy, Debug)]
struct Cost {
    bars: u32,
    waste: f64,
    utilization: f64,
}

impl Cost {
    const ZERO: Cost = Cost {
        bars: 0,
        waste: 0.0,
        utilization: 0.0,
    };

    const INFEASIBLE: Cost = Cost {
        bars: u32::MAX,
        waste: f64::INFINITY,
        utilization: 0.0,
    };

    fn is_feasible(&self) -> bool {
        self.bars != u32::MAX
    }

    /// Fewer bars, then less waste, then a fuller pattern.
    fn compare(&self, other: &Cost, epsilon: f64) -> Ordering {
        self.bars.cmp(&other.bars).then_with(|| {
            if (self.waste - other.waste).abs() > epsilon {
                self.waste
                    .partial_cmp(&other.waste)
                    .unwrap_or(Ordering::Equal)
            } else {
                other
                    .utilization
                    .partial_cmp(&self.utilization)
                    .unwrap_or(Ordering::Equal)
            }
        })
    }
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    cost: Cost,
    pattern: Option<usize>,
}

/// Patterns grouped by the types they contain, in search order.
struct Tables<'p> {
    patterns: &'p [Pattern],
    containing: Vec<Vec<usize>>,
}

impl<'p> Tables<'p> {
    fn new(patterns: &'p [Pattern], type_count: usize) -> Self {
        let mut containing = vec![Vec::new(); type_count];
        for (index, pattern) in patterns.iter().enumerate() {
            for &(t, _) in &pattern.counts {
                containing[t].push(index);
            }
        }
        Tables {
            patterns,
            containing,
        }
    }
}

struct Search<'c, 'a, P: ?Sized> {
    catalog: &'c SegmentCatalog<'a>,
    config: &'c SolverConfig,
    progress: &'c P,
    memo: BoundedCache<Demand, Entry>,
    expansions: usize,
    exhausted: bool,
}

impl<'c, 'a, P> Search<'c, 'a, P>
where
    P: ProgressSink + ?Sized,
{
    /// Best entry for `demand`, or `None` once the budget is exhausted.
    fn best(&mut self, tables: &Tables<'_>, demand: &Demand) -> Option<Entry> {
        let Some(first) = first_outstanding(demand) else {
            return Some(Entry {
                cost: Cost::ZERO,
                pattern: None,
            });
        };
        if let Some(entry) = self.memo.get(demand) {
            return Some(*entry);
        }
        if self.exhausted {
            return None;
        }

        self.expansions += 1;
        if self.expansions > self.config.dp_state_limit || self.config.is_cancelled() {
            self.exhausted = true;
            return None;
        }
        if self.expansions % REPORT_EVERY == 0 {
            let fraction = self.expansions as f64 / self.config.dp_state_limit.max(1) as f64;
            self.progress
                .report(&Progress::new(DYNAMIC_PROGRAMMING, "search", fraction));
        }

        let lower_bound = self.catalog.lower_bound(demand) as u32;
        let capacity = self.catalog.capacity();
        let mut best = Entry {
            cost: Cost::INFEASIBLE,
            pattern: None,
        };

        for &index in &tables.containing[first] {
            let pattern = &tables.patterns[index];
            if !pattern.applies_to(demand) {
                continue;
            }
            let mut next = demand.clone();
            pattern.apply(&mut next);

            let sub = self.best(tables, &next)?;
            if !sub.cost.is_feasible() {
                continue;
            }
            let cost = Cost {
                bars: sub.cost.bars + 1,
                waste: sub.cost.waste + pattern.waste,
                utilization: pattern.utilization(capacity),
            };
            if cost.compare(&best.cost, self.config.epsilon) == Ordering::Less {
                best = Entry {
                    cost,
                    pattern: Some(index),
                };
            }
            if best.cost.bars <= lower_bound {
                break;
            }
        }

        self.memo.insert(demand.clone(), best);
        Some(best)
    }

    /// Follows the memo from `demand` down to the empty state.
    fn plan(&mut self, tables: &Tables<'_>, demand: &Demand) -> Option<Vec<Pattern>> {
        let mut demand = demand.clone();
        let mut plan = Vec::new();
        loop {
            let entry = self.best(tables, &demand)?;
            if !entry.cost.is_feasible() {
                return None;
            }
            match entry.pattern {
                Some(index) => {
                    let pattern = &tables.patterns[index];
                    pattern.apply(&mut demand);
                    plan.push(pattern.clone());
                }
                None => return Some(plan),
            }
        }
    }
}

/// Solves with exact dynamic programming when the instance is small enough, and with column
/// generation otherwise.
#[instrument(skip_all, fields(diameter = diameter, segments = segments.len()))]
pub fn solve_dp<P>(
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
        return Ok(SolveResult::empty(DYNAMIC_PROGRAMMING, diameter));
    }

    let start = Instant::now();
    let catalog = SegmentCatalog::new(segments, config);
    let demand = catalog.demand();
    let lower_bound = catalog.lower_bound(&demand);

    if segments.len() > config.dp_max_units || catalog.type_count() > config.dp_max_types {
        info!(
            units = segments.len(),
            types = catalog.type_count(),
            "instance above exact thresholds, using column generation"
        );
        return Ok(with_column_generation(
            &catalog, diameter, config, progress, start, 0, false,
        ));
    }

    progress.report(&Progress::new(DYNAMIC_PROGRAMMING, "enumerate", 0.0));
    let set = enumerate_patterns(&catalog, &demand, config);
    debug!(
        patterns = set.patterns.len(),
        complete = set.complete,
        "enumerated patterns"
    );

    let tables = Tables::new(&set.patterns, catalog.type_count());
    let mut search = Search {
        catalog: &catalog,
        config,
        progress,
        memo: BoundedCache::new(config.dp_memo_capacity),
        expansions: 0,
        exhausted: false,
    };

    let plan = search.plan(&tables, &demand);
    let expansions = search.expansions;
    if search.memo.clears() > 0 {
        debug!(
            clears = search.memo.clears(),
            entries = search.memo.len(),
            "memo overflowed"
        );
    }

    let Some(plan) = plan else {
        warn!(
            expansions,
            exhausted = search.exhausted,
            "exact search gave no plan, using column generation"
        );
        return Ok(with_column_generation(
            &catalog,
            diameter,
            config,
            progress,
            start,
            expansions,
            search.exhausted,
        ));
    };

    let built = materialize(&catalog, &plan, config);
    if built.spilled > 0 {
        warn!(spilled = built.spilled, "plan left segments to best-fit placement");
    }
    let status = if set.complete && built.spilled == 0 {
        SolveStatus::Optimal
    } else {
        SolveStatus::Heuristic
    };
    let bins = built.bins;
    let stats = SearchStats {
        nodes_explored: expansions,
        iterations: 0,
        lower_bound: Some(lower_bound),
        elapsed: start.elapsed(),
    };
    let result =
        SolveResult::from_bins(DYNAMIC_PROGRAMMING, "exact", diameter, status, bins, stats);

    progress.report(
        &Progress::new(DYNAMIC_PROGRAMMING, "done", 1.0)
            .with_solution(result.total_bars_used, result.total_waste),
    );
    info!(
        bars = result.total_bars_used,
        waste = result.total_waste,
        expansions,
        status = ?result.status,
        "dynamic programming finished"
    );
    Ok(result)
}

fn with_column_generation<P>(
    catalog: &SegmentCatalog<'_>,
    diameter: u32,
    config: &SolverConfig,
    progress: &P,
    start: Instant,
    expansions: usize,
    exhausted: bool,
) -> SolveResult
where
    P: ProgressSink + ?Sized,
{
    let outcome = column_generation(catalog, config, DYNAMIC_PROGRAMMING, progress);
    let status = if exhausted || outcome.cancelled {
        SolveStatus::BudgetExhausted
    } else {
        SolveStatus::Heuristic
    };
    let bins = materialize(catalog, &outcome.plan, config).bins;
    let stats = SearchStats {
        nodes_explored: expansions,
        iterations: outcome.iterations,
        lower_bound: Some(catalog.lower_bound(&catalog.demand())),
        elapsed: start.elapsed(),
    };
    let result = SolveResult::from_bins(
        DYNAMIC_PROGRAMMING,
        "column_generation",
        diameter,
        status,
        bins,
        stats,
    );
    progress.report(
        &Progress::new(DYNAMIC_PROGRAMMING, "done", 1.0)
            .with_solution(result.total_bars_used, result.total_waste),
    );
    result
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
    fn finds_optimum_greedy_misses() {
        // Best-Fit Decreasing needs 3 bars here, two bars of 5+4+3 are optimal.
        let segments = segments(&[5.0, 5.0, 4.0, 4.0, 3.0, 3.0]);
        let config = SolverConfig::default().with_standard_length(12.0);
        let result = solve_dp(&segments, 16, &config, &NoProgress).unwrap();

        assert_eq!(result.total_bars_used, 2);
        assert_eq!(result.status, SolveStatus::Optimal);
        assert_eq!(result.method, "exact");
        assert!(result.total_waste.abs() < 1e-6);
    }

    #[test]
    fn keeps_split_pieces_on_separate_bars() {
        // Five 12.0 heads, tails of 4.8 x3 and 2.8 x2, and a whole 5.4. The three 4.8 tails
        // may not share bars, which still leaves {4.8, 2.8} x2 and {4.8, 5.4}.
        let config = SolverConfig::default();
        let requests = [
            CuttingRequest::new("R0", 16.4, 3).with_lap(0.4),
            CuttingRequest::new("R1", 14.4, 2).with_lap(0.4),
            CuttingRequest::new("R2", 5.4, 1),
        ];
        let segments = derive_segments(&requests, &config).unwrap();
        let result = solve_dp(&segments, 16, &config, &NoProgress).unwrap();

        assert_eq!(result.method, "exact");
        assert_eq!(result.total_bars_used, 8);
        assert_eq!(result.status, SolveStatus::Optimal);
        assert_eq!(result.summary.total_segments, 11);
    }

    #[test]
    fn large_instance_uses_column_generation() {
        let segments = segments(&[2.0; 60]);
        let result = solve_dp(&segments, 16, &SolverConfig::default(), &NoProgress).unwrap();
        assert_eq!(result.algorithm_name, DYNAMIC_PROGRAMMING);
        assert_eq!(result.method, "column_generation");
        assert_eq!(result.total_bars_used, 10);
    }

    #[test]
    fn exhausted_budget_falls_back() {
        let segments = segments(&[5.0, 4.5, 4.0, 3.5, 3.0, 2.5, 2.0, 1.5]);
        let config = SolverConfig::default().with_dp_budget(1_000, 1);
        let result = solve_dp(&segments, 16, &config, &NoProgress).unwrap();
        assert_eq!(result.status, SolveStatus::BudgetExhausted);
        assert_eq!(result.summary.total_segments, segments.len());
    }

    #[test]
    fn tiny_memo_still_reconstructs() {
        let segments = segments(&[5.0, 5.0, 4.0, 4.0, 3.0, 3.0]);
        let config = SolverConfig::default().with_dp_budget(1, 1_000_000);
        let result = solve_dp(&segments, 16, &config, &NoProgress).unwrap();
        assert_eq!(result.total_bars_used, 2);
    }

    #[test]
    fn cost_ordering() {
        let a = Cost {
            bars: 2,
            waste: 1.0,
            utilization: 0.5,
        };
        let b = Cost {
            bars: 2,
            waste: 1.0,
            utilization: 0.9,
        };
        let c = Cost {
            bars: 3,
            waste: 0.0,
            utilization: 1.0,
        };
        assert_eq!(b.compare(&a, 1e-3), Ordering::Less);
        assert_eq!(a.compare(&c, 1e-3), Ordering::Less);
        assert_eq!(c.compare(&Cost::INFEASIBLE, 1e-3), Ordering::Less);
    }
}
