//! Solve results.

use crate::bin::WorkBin;
use std::time::Duration;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// What a pattern is cut from.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BarOrigin {
    /// A new standard bar.
    NewBar,
    /// A reused offcut.
    Offcut {
        /// ID of the consumed offcut.
        offcut_id: String,
        /// Job or bar the offcut came from.
        source_id: Option<String>,
    },
}

/// A group of identical cuts within a pattern.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct PatternCut {
    /// Space consumed by each cut.
    pub cutting_length: f64,

    /// Length each cut contributes to its finished piece.
    pub effective_length: f64,

    /// Lap carried by each cut.
    pub lap_length: f64,

    /// Number of cuts of this kind.
    pub count: usize,
}

/// A segment placed by the optimizer.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedSegment {
    /// ID of the placed segment.
    pub segment_id: usize,

    /// Request the segment belongs to.
    pub parent_request_id: String,

    /// Physical piece of the request the segment belongs to.
    pub repetition: usize,

    /// Position of the segment within its piece.
    pub segment_index: usize,

    /// Length the segment contributes to its finished piece.
    pub effective_length: f64,

    /// Whether the segment is part of a split piece.
    pub is_from_multi_bar: bool,

    /// Start location of this segment within the bar.
    pub start: f64,

    /// End location of this segment within the bar.
    pub end: f64,
}

/// One bar (or offcut) and the segments to cut from it.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct CuttingPattern {
    /// Position of this pattern in the result.
    pub id: usize,

    /// Cuts grouped by kind.
    pub cuts: Vec<PatternCut>,

    /// The individual segments, in cutting order.
    pub segments: Vec<PlacedSegment>,

    /// Length left over after cutting.
    pub waste: f64,

    /// Share of the bar in use, from 0.0 to 1.0.
    pub utilization: f64,

    /// Length of the bar or offcut.
    pub bar_length: f64,

    /// What the pattern is cut from.
    pub origin: BarOrigin,
}

impl CuttingPattern {
    /// Total space consumed by the cuts.
    pub fn used_length(&self) -> f64 {
        self.cuts
            .iter()
            .map(|cut| cut.cutting_length * cut.count as f64)
            .sum()
    }

    /// Whether this pattern is cut from a reused offcut.
    pub fn is_offcut(&self) -> bool {
        matches!(self.origin, BarOrigin::Offcut { .. })
    }
}

/// How much confidence a result carries.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SolveStatus {
    /// Proven optimal within the enumerated pattern space.
    Optimal,
    /// Produced by a heuristic that makes no optimality claim.
    Heuristic,
    /// A budget ran out or the solve was cancelled; this is the best solution found so far.
    BudgetExhausted,
    /// Nothing to cut, or no solution exists.
    Empty,
}

/// Counters collected while searching.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchStats {
    /// Branch-and-bound nodes or DP states expanded.
    pub nodes_explored: usize,

    /// Column generation iterations or swap passes run.
    pub iterations: usize,

    /// Lower bound on the number of standard bars, when the solver computed one.
    pub lower_bound: Option<usize>,

    /// Wall-clock time spent.
    pub elapsed: Duration,
}

/// Aggregates describing a result.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolveSummary {
    /// Number of segments placed.
    pub total_segments: usize,

    /// Space consumed by all segments.
    pub total_cutting_length: f64,

    /// Effective length of all segments.
    pub total_effective_length: f64,

    /// Waste on new standard bars.
    pub new_bar_waste: f64,

    /// Waste on reused offcuts.
    pub offcut_waste: f64,

    /// Number of offcuts cut from.
    pub offcuts_used: usize,

    /// IDs of the offcuts cut from, in pattern order.
    pub consumed_offcuts: Vec<String>,

    /// Search counters.
    pub stats: SearchStats,
}

/// A leftover long enough to keep.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct Remnant {
    /// Pattern producing the leftover.
    pub pattern_id: usize,

    /// Length of the leftover.
    pub length: f64,

    /// What the producing pattern is cut from.
    pub origin: BarOrigin,
}

/// The outcome of one solve.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct SolveResult {
    /// Name of the algorithm that was asked to solve.
    pub algorithm_name: String,

    /// Method the algorithm actually used, e.g. `"exact"` or `"column_generation"`.
    pub method: String,

    /// Diameter the result is for.
    pub diameter: u32,

    /// Confidence of the result.
    pub status: SolveStatus,

    /// Patterns to cut.
    pub patterns: Vec<CuttingPattern>,

    /// Number of new standard bars consumed. Offcuts are not counted.
    pub total_bars_used: usize,

    /// Waste over all patterns, offcuts included.
    pub total_waste: f64,

    /// Mean utilization over all patterns.
    pub average_utilization: f64,

    /// Aggregates.
    pub summary: SolveSummary,
}

impl SolveResult {
    /// A result with no patterns.
    pub fn empty(algorithm_name: &str, diameter: u32) -> Self {
        Self {
            algorithm_name: algorithm_name.to_string(),
            method: "none".to_string(),
            diameter,
            status: SolveStatus::Empty,
            patterns: Vec::new(),
            total_bars_used: 0,
            total_waste: 0.0,
            average_utilization: 0.0,
            summary: Default::default(),
        }
    }

    pub(crate) fn from_bins(
        algorithm_name: &str,
        method: &str,
        diameter: u32,
        status: SolveStatus,
        bins: Vec<WorkBin<'_>>,
        stats: SearchStats,
    ) -> Self {
        let patterns: Vec<CuttingPattern> = bins
            .into_iter()
            .filter(|bin| !bin.is_empty())
            .enumerate()
            .map(|(id, bin)| bin.into_pattern(id))
            .collect();

        if patterns.is_empty() {
            let mut result = Self::empty(algorithm_name, diameter);
            result.summary.stats = stats;
            return result;
        }

        let mut summary = SolveSummary {
            stats,
            ..Default::default()
        };
        let mut total_bars_used = 0;
        for pattern in &patterns {
            summary.total_segments += pattern.segments.len();
            summary.total_cutting_length += pattern.used_length();
            summary.total_effective_length += pattern
                .segments
                .iter()
                .map(|s| s.effective_length)
                .sum::<f64>();
            match &pattern.origin {
                BarOrigin::NewBar => {
                    total_bars_used += 1;
                    summary.new_bar_waste += pattern.waste;
                }
                BarOrigin::Offcut { offcut_id, .. } => {
                    summary.offcuts_used += 1;
                    summary.offcut_waste += pattern.waste;
                    summary.consumed_offcuts.push(offcut_id.clone());
                }
            }
        }

        let average_utilization =
            patterns.iter().map(|p| p.utilization).sum::<f64>() / patterns.len() as f64;

        Self {
            algorithm_name: algorithm_name.to_string(),
            method: method.to_string(),
            diameter,
            status,
            total_bars_used,
            total_waste: summary.new_bar_waste + summary.offcut_waste,
            average_utilization,
            patterns,
            summary,
        }
    }

    /// Whether the result is proven optimal.
    pub fn is_optimal(&self) -> bool {
        self.status == SolveStatus::Optimal
    }

    /// Leftovers of at least `min_length`, one per pattern, in pattern order.
    pub fn remnants(&self, min_length: f64) -> Vec<Remnant> {
        self.patterns
            .iter()
            .filter(|p| p.waste >= min_length)
            .map(|p| Remnant {
                pattern_id: p.id,
                length: p.waste,
                origin: p.origin.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::offcut::OffcutPiece;
    use crate::request::Segment;

    #[test]
    fn from_bins_splits_waste_by_origin() {
        let config = SolverConfig::default();
        let segments: Vec<Segment> = [6.0, 5.0, 2.0]
            .iter()
            .enumerate()
            .map(|(i, &l)| Segment::new(i, format!("R{i}"), l))
            .collect();

        let mut bar = WorkBin::new_bar(12.0);
        bar.insert_segment(&segments[0], &config);
        bar.insert_segment(&segments[1], &config);
        let mut offcut = WorkBin::from_offcut(&OffcutPiece::new("O", 3.0));
        offcut.insert_segment(&segments[2], &config);
        let empty = WorkBin::new_bar(12.0);

        let result = SolveResult::from_bins(
            "greedy",
            "best_fit",
            16,
            SolveStatus::Heuristic,
            vec![bar, empty, offcut],
            Default::default(),
        );

        assert_eq!(result.patterns.len(), 2);
        assert_eq!(result.total_bars_used, 1);
        assert!((result.summary.new_bar_waste - 1.0).abs() < 1e-9);
        assert!((result.summary.offcut_waste - 1.0).abs() < 1e-9);
        assert!((result.total_waste - 2.0).abs() < 1e-9);
        assert_eq!(result.summary.consumed_offcuts, vec!["O".to_string()]);
        assert_eq!(result.summary.total_segments, 3);
        assert_eq!(result.patterns[1].id, 1);
    }

    #[test]
    fn empty_bins_give_empty_result() {
        let result = SolveResult::from_bins(
            "greedy",
            "best_fit",
            16,
            SolveStatus::Heuristic,
            vec![WorkBin::new_bar(12.0)],
            Default::default(),
        );
        assert_eq!(result.status, SolveStatus::Empty);
        assert_eq!(result.total_bars_used, 0);
        assert!(result.patterns.is_empty());
    }

    #[test]
    fn remnants_respect_threshold() {
        let config = SolverConfig::default();
        let segments = [Segment::new(0, "A", 9.0), Segment::new(1, "B", 11.5)];
        let bins: Vec<WorkBin> = segments
            .iter()
            .map(|s| {
                let mut bin = WorkBin::new_bar(12.0);
                bin.insert_segment(s, &config);
                bin
            })
            .collect();
        let result = SolveResult::from_bins(
            "greedy",
            "best_fit",
            16,
            SolveStatus::Heuristic,
            bins,
            Default::default(),
        );

        let remnants = result.remnants(1.0);
        assert_eq!(remnants.len(), 1);
        assert_eq!(remnants[0].pattern_id, 0);
        assert!((remnants[0].length - 3.0).abs() < 1e-9);
    }
}
