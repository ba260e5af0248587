//! Column generation heuristic for instances too large for exact search.
//!
//! A pool of patterns is covered greedily against the demand. Each round prices the segment types
//! by how poorly the current cover uses the bars they sit on, and a bounded knapsack finds the
//! pattern with the highest price. That pattern joins the pool and the cover is rebuilt. The
//! rounds stop when no pattern prices above one bar, the new pattern is already pooled, or the
//! iteration budget runs out.

use crate::config::SolverConfig;
use crate::pattern::{first_outstanding, plan_waste, Demand, Pattern, SegmentCatalog, TypeCounts};
use crate::progress::{Progress, ProgressSink};
use smallvec::SmallVec;
use tracing::debug;

/// Keeps zero-waste patterns from dividing by zero while still ranking them first.
const WASTE_FLOOR: f64 = 0.01;

/// Most cells in a knapsack grid. Longer bars get a coarser grid.
const MAX_CELLS: usize = 20_000;

#[derive(Clone, Debug)]
pub(crate) struct CgOutcome {
    pub(crate) plan: Vec<Pattern>,
    pub(crate) iterations: usize,
    pub(crate) cancelled: bool,
}

pub(crate) fn column_generation<P>(
    catalog: &SegmentCatalog<'_>,
    config: &SolverConfig,
    algorithm: &'static str,
    progress: &P,
) -> CgOutcome
where
    P: ProgressSink + ?Sized,
{
    let demand = catalog.demand();
    let mut pool = single_type_patterns(catalog, &demand);
    let mut current = set_cover(catalog, &pool, &demand);
    let mut best = current.clone();
    let knapsack = Knapsack::new(catalog, &demand, config);

    let mut iterations = 0;
    let mut cancelled = false;
    while iterations < config.cg_max_iterations {
        if config.is_cancelled() {
            cancelled = true;
            break;
        }
        iterations += 1;

        let prices = type_prices(catalog, &current);
        let Some((pattern, value)) = knapsack.solve(catalog, &prices) else {
            break;
        };
        if value <= 1.0 + config.epsilon {
            debug!(iterations, value, "no pattern prices above one bar");
            break;
        }
        if pool.iter().any(|p| p.counts == pattern.counts) {
            debug!(iterations, "generated pattern already pooled");
            break;
        }
        pool.push(pattern);

        current = set_cover(catalog, &pool, &demand);
        if is_better(&current, &best, config.epsilon) {
            best = current.clone();
        }
        progress.report(
            &Progress::new(
                algorithm,
                "column_generation",
                iterations as f64 / config.cg_max_iterations.max(1) as f64,
            )
            .with_solution(best.len(), plan_waste(&best)),
        );
    }

    debug!(
        iterations,
        pool = pool.len(),
        bars = best.len(),
        "column generation finished"
    );
    CgOutcome {
        plan: best,
        iterations,
        cancelled,
    }
}

fn is_better(plan: &[Pattern], other: &[Pattern], epsilon: f64) -> bool {
    plan.len() < other.len()
        || (plan.len() == other.len() && plan_waste(plan) + epsilon < plan_waste(other))
}

/// One pattern per type holding as many copies as fit.
fn single_type_patterns(catalog: &SegmentCatalog<'_>, demand: &Demand) -> Vec<Pattern> {
    (0..catalog.type_count())
        .filter(|&t| demand[t] > 0)
        .map(|t| {
            let mut count = 1;
            let most = demand[t].min(catalog.per_pattern_cap(t));
            let length = catalog.cutting_length(t);
            while count < most && catalog.fits(0.0, length * (count + 1) as f64) {
                count += 1;
            }
            Pattern::new(std::iter::once((t, count)).collect(), catalog)
        })
        .collect()
}

/// Greedy cover of `demand` by the pool.
///
/// Each step takes the pattern covering the most length per unit of waste, with counts cut
/// down to what is still outstanding, and tops the bar up with any outstanding types that
/// still fit.
pub(crate) fn set_cover(
    catalog: &SegmentCatalog<'_>,
    pool: &[Pattern],
    demand: &Demand,
) -> Vec<Pattern> {
    let capacity = catalog.capacity();
    let mut remaining = demand.clone();
    let mut plan = Vec::new();

    while first_outstanding(&remaining).is_some() {
        let mut best: Option<(f64, TypeCounts)> = None;
        for pattern in pool {
            let counts: TypeCounts = pattern
                .counts
                .iter()
                .map(|&(t, c)| (t, c.min(remaining[t])))
                .filter(|&(_, c)| c > 0)
                .collect();
            let covered: f64 = counts
                .iter()
                .map(|&(t, c)| catalog.cutting_length(t) * c as f64)
                .sum();
            if covered <= 0.0 {
                continue;
            }
            let score = covered / ((capacity - covered).max(0.0) + WASTE_FLOOR);
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, counts));
            }
        }
        let Some((_, counts)) = best else {
            break;
        };

        let pattern = Pattern::new(top_up(catalog, counts, &remaining), catalog);
        pattern.apply(&mut remaining);
        plan.push(pattern);
    }
    plan
}

/// Fills the rest of the bar with outstanding types, at most one piece per split request.
fn top_up(catalog: &SegmentCatalog<'_>, mut counts: TypeCounts, remaining: &Demand) -> TypeCounts {
    let mut used: f64 = counts
        .iter()
        .map(|&(t, c)| catalog.cutting_length(t) * c as f64)
        .sum();
    for t in 0..catalog.type_count() {
        let length = catalog.cutting_length(t);
        loop {
            let taken = counts
                .iter()
                .find(|&&(ct, _)| ct == t)
                .map_or(0, |&(_, c)| c);
            if taken >= remaining[t].min(catalog.per_pattern_cap(t))
                || (taken == 0 && catalog.excludes(&counts, t))
                || !catalog.fits(used, length)
            {
                break;
            }
            match counts.iter_mut().find(|(ct, _)| *ct == t) {
                Some((_, c)) => *c += 1,
                None => counts.push((t, 1)),
            }
            used += length;
        }
    }
    counts.sort_unstable_by_key(|&(t, _)| t);
    counts
}

/// Price per segment of each type.
///
/// A type's share of a bar, inflated by how empty its bars are on average in `plan`.
fn type_prices(catalog: &SegmentCatalog<'_>, plan: &[Pattern]) -> Vec<f64> {
    let capacity = catalog.capacity();
    let mut sums = vec![0.0; catalog.type_count()];
    let mut bars = vec![0usize; catalog.type_count()];
    for pattern in plan {
        let utilization = pattern.utilization(capacity);
        for &(t, _) in &pattern.counts {
            sums[t] += utilization;
            bars[t] += 1;
        }
    }
    (0..catalog.type_count())
        .map(|t| {
            let average = if bars[t] == 0 {
                1.0
            } else {
                sums[t] / bars[t] as f64
            };
            catalog.cutting_length(t) / capacity * (2.0 - average)
        })
        .collect()
}

/// Bounded knapsack over a quantized bar, with counts split into powers of two.
///
/// The grid uses `length_resolution` unless that would need more than [`MAX_CELLS`] cells, in
/// which case it coarsens to fit. Item weights round up, so a coarser grid only loses patterns
/// that are nearly full.
struct Knapsack {
    cells: usize,
    items: Vec<Item>,
}

#[derive(Clone, Copy, Debug)]
struct Item {
    type_index: usize,
    count: u32,
    weight: usize,
}

impl Knapsack {
    fn new(catalog: &SegmentCatalog<'_>, demand: &Demand, config: &SolverConfig) -> Self {
        let capacity = config.standard_length + config.fit_tolerance;
        let resolution = config.length_resolution.max(capacity / MAX_CELLS as f64);
        let cells = ((capacity / resolution + 1e-6).floor() as usize).min(MAX_CELLS);

        let mut items = Vec::new();
        for t in 0..catalog.type_count() {
            let unit = ((catalog.cutting_length(t) / resolution) - 1e-6).ceil().max(1.0) as usize;
            let bound = demand[t]
                .min((cells / unit) as u32)
                .min(catalog.per_pattern_cap(t));
            let mut left = bound;
            let mut chunk = 1;
            while left > 0 {
                let count = chunk.min(left);
                items.push(Item {
                    type_index: t,
                    count,
                    weight: unit * count as usize,
                });
                left -= count;
                chunk *= 2;
            }
        }
        Knapsack { cells, items }
    }

    /// Highest priced pattern and its price.
    fn solve(&self, catalog: &SegmentCatalog<'_>, prices: &[f64]) -> Option<(Pattern, f64)> {
        let mut value = vec![0.0f64; self.cells + 1];
        let mut keep = vec![vec![false; self.cells + 1]; self.items.len()];
        for (i, item) in self.items.iter().enumerate() {
            let gain = prices[item.type_index] * item.count as f64;
            for c in (item.weight..=self.cells).rev() {
                let candidate = value[c - item.weight] + gain;
                if candidate > value[c] {
                    value[c] = candidate;
                    keep[i][c] = true;
                }
            }
        }

        let mut counts: TypeCounts = SmallVec::new();
        let mut c = self.cells;
        for (i, item) in self.items.iter().enumerate().rev() {
            if keep[i][c] {
                match counts.iter_mut().find(|(t, _)| *t == item.type_index) {
                    Some((_, n)) => *n += item.count,
                    None => counts.push((item.type_index, item.count)),
                }
                c -= item.weight;
            }
        }
        counts.sort_unstable_by_key(|&(t, _)| t);

        // Two types of one split request can both be picked; keep the longer.
        let mut kept: TypeCounts = SmallVec::new();
        for (t, count) in counts {
            if !catalog.excludes(&kept, t) {
                kept.push((t, count));
            }
        }
        if kept.is_empty() {
            return None;
        }
        let value: f64 = kept
            .iter()
            .map(|&(t, count)| prices[t] * count as f64)
            .sum();

        let pattern = Pattern::new(kept, catalog);
        if !catalog.fits(0.0, pattern.used) {
            return None;
        }
        Some((pattern, value))
    }
}
