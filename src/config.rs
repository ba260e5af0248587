//! Solver configuration.

use crate::error::{Error, Result};
use crate::progress::CancelToken;
use std::time::{Duration, Instant};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Standard bar length used when none is configured.
pub const DEFAULT_STANDARD_LENGTH: f64 = 12.0;

/// Thresholds, budgets and tolerances shared by all solvers.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase", default))]
#[derive(Clone, Debug)]
pub struct SolverConfig {
    /// Length of a standard bar.
    pub standard_length: f64,

    /// Slack allowed when testing whether a segment fits in the remaining capacity of a bin.
    pub fit_tolerance: f64,

    /// Tolerance for length equality and rounding.
    pub epsilon: f64,

    /// Quantum used to group segments into types and to discretize knapsack grids.
    ///
    /// Knapsack grids are capped at 20 000 cells, so for long bars in fine units the grid
    /// quantum grows to `(standard_length + fit_tolerance) / 20 000`.
    pub length_resolution: f64,

    /// Maximum number of distinct segment types in one enumerated pattern.
    pub max_types_per_pattern: usize,

    /// Maximum number of patterns enumerated for the exact solvers.
    pub pattern_limit: usize,

    /// Largest total segment count solved by exact dynamic programming.
    pub dp_max_units: usize,

    /// Largest distinct segment type count solved by exact dynamic programming.
    pub dp_max_types: usize,

    /// Capacity of the dynamic programming memo.
    pub dp_memo_capacity: usize,

    /// Number of state expansions after which dynamic programming gives up.
    pub dp_state_limit: usize,

    /// Iteration budget of the column generation heuristic.
    pub cg_max_iterations: usize,

    /// Largest total segment count solved by branch-and-bound.
    pub bb_max_units: usize,

    /// Largest distinct segment type count solved by branch-and-bound.
    pub bb_max_types: usize,

    /// Number of nodes after which branch-and-bound gives up.
    pub bb_node_limit: usize,

    /// Optional wall-clock budget for branch-and-bound. `None` keeps the search deterministic.
    pub time_limit: Option<Duration>,

    /// Maximum number of refinement passes of the swap optimizer.
    pub swap_max_passes: usize,

    /// Consecutive non-improving relocations after which the relocation phase stops.
    pub swap_stall_limit: usize,

    /// Shortest leftover reported by [`SolveResult::remnants`](crate::SolveResult::remnants)
    /// when called through the optimizer.
    pub min_reusable_length: f64,

    /// Cooperative cancellation flag.
    #[cfg_attr(feature = "serialize", serde(skip))]
    pub cancel: Option<CancelToken>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            standard_length: DEFAULT_STANDARD_LENGTH,
            fit_tolerance: 0.01,
            epsilon: 1e-3,
            length_resolution: 1e-3,
            max_types_per_pattern: 4,
            pattern_limit: 5_000,
            dp_max_units: 50,
            dp_max_types: 10,
            dp_memo_capacity: 200_000,
            dp_state_limit: 2_000_000,
            cg_max_iterations: 30,
            bb_max_units: 30,
            bb_max_types: 8,
            bb_node_limit: 500_000,
            time_limit: None,
            swap_max_passes: 10,
            swap_stall_limit: 25,
            min_reusable_length: 1.0,
            cancel: None,
        }
    }
}

impl SolverConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the standard bar length.
    pub fn with_standard_length(mut self, length: f64) -> Self {
        self.standard_length = length;
        self
    }

    /// Sets the fit tolerance.
    pub fn with_fit_tolerance(mut self, tolerance: f64) -> Self {
        self.fit_tolerance = tolerance.max(0.0);
        self
    }

    /// Sets the per-pattern distinct type cap.
    pub fn with_max_types_per_pattern(mut self, max: usize) -> Self {
        self.max_types_per_pattern = max.max(1);
        self
    }

    /// Sets the pattern enumeration cap.
    pub fn with_pattern_limit(mut self, limit: usize) -> Self {
        self.pattern_limit = limit.max(1);
        self
    }

    /// Sets the size thresholds for exact dynamic programming.
    pub fn with_dp_thresholds(mut self, max_units: usize, max_types: usize) -> Self {
        self.dp_max_units = max_units;
        self.dp_max_types = max_types;
        self
    }

    /// Sets the memo capacity and the expansion budget of dynamic programming.
    pub fn with_dp_budget(mut self, memo_capacity: usize, state_limit: usize) -> Self {
        self.dp_memo_capacity = memo_capacity.max(1);
        self.dp_state_limit = state_limit;
        self
    }

    /// Sets the column generation iteration budget.
    pub fn with_cg_max_iterations(mut self, iterations: usize) -> Self {
        self.cg_max_iterations = iterations;
        self
    }

    /// Sets the size thresholds for branch-and-bound.
    pub fn with_bb_thresholds(mut self, max_units: usize, max_types: usize) -> Self {
        self.bb_max_units = max_units;
        self.bb_max_types = max_types;
        self
    }

    /// Sets the branch-and-bound node budget.
    pub fn with_bb_node_limit(mut self, limit: usize) -> Self {
        self.bb_node_limit = limit;
        self
    }

    /// Sets a wall-clock budget for branch-and-bound.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Sets the swap optimizer pass budget.
    pub fn with_swap_max_passes(mut self, passes: usize) -> Self {
        self.swap_max_passes = passes;
        self
    }

    /// Sets how many non-improving relocations end the relocation phase.
    pub fn with_swap_stall_limit(mut self, limit: usize) -> Self {
        self.swap_stall_limit = limit.max(1);
        self
    }

    /// Sets the minimum reusable leftover length.
    pub fn with_min_reusable_length(mut self, length: f64) -> Self {
        self.min_reusable_length = length.max(0.0);
        self
    }

    /// Attaches a cancellation token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Checks the values every solver relies on.
    pub fn validate(&self) -> Result<()> {
        if !self.standard_length.is_finite() || self.standard_length <= 0.0 {
            return Err(Error::InvalidStandardLength(self.standard_length));
        }
        Ok(())
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, CancelToken::is_cancelled)
    }

    /// Whether `length` fits into `remaining` capacity.
    pub(crate) fn fits(&self, length: f64, remaining: f64) -> bool {
        length <= remaining + self.fit_tolerance
    }

    /// Rounds a length to the configured resolution.
    pub(crate) fn quantize(&self, length: f64) -> i64 {
        (length / self.length_resolution).round() as i64
    }

    pub(crate) fn deadline(&self, start: Instant) -> Option<Instant> {
        self.time_limit.map(|limit| start + limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SolverConfig::default();
        assert_eq!(config.standard_length, 12.0);
        assert_eq!(config.dp_max_units, 50);
        assert_eq!(config.bb_max_types, 8);
        assert!(config.time_limit.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_standard_length() {
        for length in [0.0, -12.0, f64::NAN, f64::INFINITY] {
            let config = SolverConfig::new().with_standard_length(length);
            assert!(matches!(
                config.validate(),
                Err(Error::InvalidStandardLength(_))
            ));
        }
    }

    #[test]
    fn fits_uses_tolerance() {
        let config = SolverConfig::default();
        assert!(config.fits(6.005, 6.0));
        assert!(!config.fits(6.02, 6.0));
    }

    #[test]
    fn cancellation_flows_through_config() {
        let token = CancelToken::new();
        let config = SolverConfig::new().with_cancel_token(token.clone());
        assert!(!config.is_cancelled());
        token.cancel();
        assert!(config.is_cancelled());
    }
}
