//! Segment types, demand vectors and type-level cutting patterns.
//!
//! The exact solvers do not work with individual segments. Segments with the same cutting and
//! effective length are grouped into a type, the outstanding work is a count per type, and a
//! pattern is a multiset of types that fits one standard bar. Once a plan of patterns is found
//! it is materialized back into bins holding concrete segments.
//!
//! Segments of a split request form types of their own, tagged with the request as their
//! group. A pattern holds at most one segment of any group, so every plan over patterns already
//! honours the same-parent exclusion.

use crate::bin::WorkBin;
use crate::config::SolverConfig;
use crate::greedy::{pack_decreasing, FitRule};
use crate::request::Segment;
use fnv::FnvHashMap;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::VecDeque;

/// Outstanding count per segment type, indexed by type.
///
/// Types are numbered canonically (longest first), so the vector itself is an order-independent
/// encoding of the remaining demand and can be used directly as a memo key.
pub(crate) type Demand = SmallVec<[u32; 16]>;

/// Counts of segment types in a pattern, sorted by type.
pub(crate) type TypeCounts = SmallVec<[(usize, u32); 4]>;

/// Segments that are interchangeable for packing purposes.
#[derive(Clone, Debug)]
pub(crate) struct SegmentType {
    pub(crate) cutting_length: f64,
    pub(crate) effective_length: f64,
    /// Split request the members belong to. `None` for whole pieces.
    pub(crate) group: Option<usize>,
    /// Segment positions of this type, in input order.
    pub(crate) members: Vec<usize>,
}

/// Grouping of a segment list into types.
#[derive(Clone, Debug)]
pub(crate) struct SegmentCatalog<'a> {
    segments: &'a [Segment],
    types: Vec<SegmentType>,
    type_of: FnvHashMap<usize, usize>,
    group_count: usize,
    capacity: f64,
    fit_tolerance: f64,
}

impl<'a> SegmentCatalog<'a> {
    pub(crate) fn new(segments: &'a [Segment], config: &SolverConfig) -> Self {
        let mut groups: FnvHashMap<&str, usize> = Default::default();
        let mut by_key: FnvHashMap<(i64, i64, Option<usize>), usize> = Default::default();
        let mut types: Vec<SegmentType> = Vec::new();
        for (index, segment) in segments.iter().enumerate() {
            let group = segment.is_from_multi_bar.then(|| {
                let next = groups.len();
                *groups
                    .entry(segment.parent_request_id.as_str())
                    .or_insert(next)
            });
            let key = (
                config.quantize(segment.cutting_length),
                config.quantize(segment.effective_length),
                group,
            );
            let type_index = *by_key.entry(key).or_insert_with(|| {
                types.push(SegmentType {
                    cutting_length: segment.cutting_length,
                    effective_length: segment.effective_length,
                    group,
                    members: Vec::new(),
                });
                types.len() - 1
            });
            types[type_index].members.push(index);
        }

        // Canonical numbering: longest first, first occurrence breaks ties.
        types.sort_by(|a, b| {
            b.cutting_length
                .partial_cmp(&a.cutting_length)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    b.effective_length
                        .partial_cmp(&a.effective_length)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.members[0].cmp(&b.members[0]))
        });

        let mut type_of: FnvHashMap<usize, usize> = Default::default();
        for (type_index, segment_type) in types.iter().enumerate() {
            for &member in &segment_type.members {
                type_of.insert(segments[member].segment_id, type_index);
            }
        }

        SegmentCatalog {
            segments,
            types,
            type_of,
            group_count: groups.len(),
            capacity: config.standard_length,
            fit_tolerance: config.fit_tolerance,
        }
    }

    pub(crate) fn segments(&self) -> &'a [Segment] {
        self.segments
    }

    pub(crate) fn types(&self) -> &[SegmentType] {
        &self.types
    }

    pub(crate) fn type_count(&self) -> usize {
        self.types.len()
    }

    pub(crate) fn capacity(&self) -> f64 {
        self.capacity
    }

    pub(crate) fn cutting_length(&self, type_index: usize) -> f64 {
        self.types[type_index].cutting_length
    }

    /// The full demand of the segment list.
    pub(crate) fn demand(&self) -> Demand {
        self.types.iter().map(|t| t.members.len() as u32).collect()
    }

    /// Material still to be placed.
    pub(crate) fn material(&self, demand: &Demand) -> f64 {
        demand
            .iter()
            .zip(&self.types)
            .map(|(&count, t)| count as f64 * t.cutting_length)
            .sum()
    }

    /// Lower bound on the bars needed for `demand`.
    ///
    /// The largest of the material bound, the number of segments longer than half a bar, and
    /// the outstanding segments of any one split request. No two segments of either of the
    /// last two kinds share a bar.
    pub(crate) fn lower_bound(&self, demand: &Demand) -> usize {
        let per_bar = self.capacity + self.fit_tolerance;
        let material = (self.material(demand) / per_bar - 1e-9).ceil().max(0.0) as usize;
        let long = demand
            .iter()
            .zip(&self.types)
            .filter(|(_, t)| t.cutting_length * 2.0 > per_bar)
            .map(|(&count, _)| count as usize)
            .sum();

        let mut split: SmallVec<[usize; 8]> = SmallVec::from_elem(0, self.group_count);
        for (&count, t) in demand.iter().zip(&self.types) {
            if let Some(group) = t.group {
                split[group] += count as usize;
            }
        }
        let split = split.into_iter().max().unwrap_or(0);

        material.max(long).max(split)
    }

    /// Most segments of `type_index` one bar may hold.
    pub(crate) fn per_pattern_cap(&self, type_index: usize) -> u32 {
        if self.types[type_index].group.is_some() {
            1
        } else {
            u32::MAX
        }
    }

    /// Whether a segment of `type_index` may not join `counts` because both hold a piece of the
    /// same split request.
    pub(crate) fn excludes(&self, counts: &TypeCounts, type_index: usize) -> bool {
        match self.types[type_index].group {
            Some(group) => counts
                .iter()
                .any(|&(t, _)| self.types[t].group == Some(group)),
            None => false,
        }
    }

    pub(crate) fn fits(&self, used: f64, length: f64) -> bool {
        used + length <= self.capacity + self.fit_tolerance
    }

    /// The type-level pattern of a bin holding segments of this catalog.
    pub(crate) fn pattern_of(&self, bin: &WorkBin<'_>) -> Pattern {
        let mut counts: TypeCounts = SmallVec::new();
        for used in bin.segments() {
            let Some(&type_index) = self.type_of.get(&used.segment.segment_id) else {
                continue;
            };
            match counts.iter_mut().find(|(t, _)| *t == type_index) {
                Some((_, count)) => *count += 1,
                None => counts.push((type_index, 1)),
            }
        }
        counts.sort_unstable_by_key(|&(t, _)| t);
        Pattern::new(counts, self)
    }
}

/// A multiset of segment types that fits one standard bar.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Pattern {
    pub(crate) counts: TypeCounts,
    pub(crate) used: f64,
    pub(crate) waste: f64,
    pub(crate) units: u32,
}

impl Pattern {
    pub(crate) fn new(counts: TypeCounts, catalog: &SegmentCatalog<'_>) -> Self {
        let used = counts
            .iter()
            .map(|&(t, c)| catalog.cutting_length(t) * c as f64)
            .sum::<f64>();
        Pattern {
            units: counts.iter().map(|&(_, c)| c).sum(),
            waste: (catalog.capacity() - used).max(0.0),
            used,
            counts,
        }
    }

    pub(crate) fn utilization(&self, capacity: f64) -> f64 {
        (self.used / capacity).min(1.0)
    }

    /// Whether every count is covered by `demand`.
    pub(crate) fn applies_to(&self, demand: &Demand) -> bool {
        self.counts.iter().all(|&(t, c)| demand[t] >= c)
    }

    /// Removes this pattern's segments from `demand`. The pattern must apply.
    pub(crate) fn apply(&self, demand: &mut Demand) {
        for &(t, c) in &self.counts {
            demand[t] -= c;
        }
    }

    /// Search order: least waste first, then most segments, then lowest types.
    pub(crate) fn search_order(&self, other: &Pattern) -> Ordering {
        self.waste
            .partial_cmp(&other.waste)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.units.cmp(&self.units))
            .then_with(|| self.counts.cmp(&other.counts))
    }
}

/// First type with outstanding demand.
pub(crate) fn first_outstanding(demand: &Demand) -> Option<usize> {
    demand.iter().position(|&count| count > 0)
}

/// Outcome of a pattern enumeration.
#[derive(Clone, Debug)]
pub(crate) struct PatternSet {
    pub(crate) patterns: Vec<Pattern>,
    /// `false` when the pattern cap or the per-pattern type cap left feasible patterns out.
    pub(crate) complete: bool,
}

/// Enumerates every pattern whose counts stay within `demand`, with at most
/// `max_types_per_pattern` distinct types and at most `pattern_limit` patterns. No pattern holds
/// two segments of one split request.
///
/// Depth-first with an explicit stack: each frame is a partial pattern and the next type that
/// may be added to it, so every combination is produced exactly once.
pub(crate) fn enumerate_patterns(
    catalog: &SegmentCatalog<'_>,
    demand: &Demand,
    config: &SolverConfig,
) -> PatternSet {
    let type_count = catalog.type_count();
    let max_types = config.max_types_per_pattern.max(1);
    let limit = config.pattern_limit.max(1);

    let mut patterns: Vec<Pattern> = Vec::new();
    let mut complete = true;
    let mut stack: Vec<(usize, TypeCounts, f64)> = vec![(0, SmallVec::new(), 0.0)];

    'search: while let Some((next_type, counts, used)) = stack.pop() {
        for t in next_type..type_count {
            if demand[t] == 0
                || catalog.excludes(&counts, t)
                || !catalog.fits(used, catalog.cutting_length(t))
            {
                continue;
            }
            if counts.len() >= max_types {
                complete = false;
                break;
            }
            let length = catalog.cutting_length(t);
            let most = demand[t].min(catalog.per_pattern_cap(t));
            let mut count = 1;
            while count <= most && catalog.fits(used, length * count as f64) {
                if patterns.len() >= limit {
                    complete = false;
                    break 'search;
                }
                let mut child = counts.clone();
                child.push((t, count));
                let child_used = used + length * count as f64;
                patterns.push(Pattern::new(child.clone(), catalog));
                stack.push((t + 1, child, child_used));
                count += 1;
            }
        }
    }

    patterns.sort_by(Pattern::search_order);
    PatternSet { patterns, complete }
}

/// Bins built from a plan.
pub(crate) struct Materialized<'a> {
    pub(crate) bins: Vec<WorkBin<'a>>,
    /// Segments the plan could not place, packed afterwards with Best-Fit.
    pub(crate) spilled: usize,
}

/// Turns a plan of type-level patterns into bins holding concrete segments.
///
/// Segments of each type are handed out in input order, skipping any that would share a bar
/// with another part of the same split request. A segment the plan does not cover, or cannot
/// place without such a conflict, is packed afterwards with Best-Fit and counted as spilled.
pub(crate) fn materialize<'a>(
    catalog: &SegmentCatalog<'a>,
    plan: &[Pattern],
    config: &SolverConfig,
) -> Materialized<'a> {
    let segments = catalog.segments();
    let mut queues: Vec<VecDeque<usize>> = catalog
        .types()
        .iter()
        .map(|t| t.members.iter().copied().collect())
        .collect();

    let mut bins: Vec<WorkBin<'a>> = Vec::with_capacity(plan.len());
    let mut spilled_ids: Vec<usize> = Vec::new();

    for pattern in plan {
        let mut bin = WorkBin::new_bar(config.standard_length);
        for &(t, count) in &pattern.counts {
            for _ in 0..count {
                let queue = &mut queues[t];
                let pick = queue
                    .iter()
                    .position(|&i| !bin.conflicts_with(&segments[i]));
                match pick.and_then(|p| queue.remove(p)) {
                    Some(i) => bin.push(&segments[i]),
                    None => {
                        if let Some(i) = queue.pop_front() {
                            spilled_ids.push(i);
                        }
                    }
                }
            }
        }
        bins.push(bin);
    }

    // Anything the plan did not cover is placed as well, so no segment is ever lost.
    spilled_ids.extend(queues.into_iter().flatten());
    if !spilled_ids.is_empty() {
        spilled_ids.sort_unstable();
        place_leftovers(&mut bins, segments, &spilled_ids, config);
    }
    Materialized {
        bins,
        spilled: spilled_ids.len(),
    }
}

fn place_leftovers<'a>(
    bins: &mut Vec<WorkBin<'a>>,
    segments: &'a [Segment],
    leftovers: &[usize],
    config: &SolverConfig,
) {
    for &i in leftovers {
        let segment = &segments[i];
        let target = bins
            .iter()
            .enumerate()
            .filter(|(_, bin)| bin.can_accept(segment, config))
            .min_by(|(_, a), (_, b)| {
                a.remaining()
                    .partial_cmp(&b.remaining())
                    .unwrap_or(Ordering::Equal)
            })
            .map(|(index, _)| index);
        match target {
            Some(index) => bins[index].push(segment),
            None => {
                let mut bin = WorkBin::new_bar(config.standard_length);
                bin.push(segment);
                bins.push(bin);
            }
        }
    }
}

/// Best-Fit Decreasing on standard bars only, expressed as type-level patterns.
pub(crate) fn greedy_plan(catalog: &SegmentCatalog<'_>, config: &SolverConfig) -> Vec<Pattern> {
    pack_decreasing(catalog.segments(), &[], FitRule::BestFit, config)
        .iter()
        .map(|bin| catalog.pattern_of(bin))
        .collect()
}

/// Total waste of a plan on standard bars.
pub(crate) fn plan_waste(plan: &[Pattern]) -> f64 {
    plan.iter().map(|p| p.waste).sum()
}
