//! Move scoring for the relocation phase.

/// Credit for a move that leaves its source bin empty. Dominates every other term.
pub(crate) const EMPTY_SOURCE_BONUS: f64 = 1_000.0;

/// Target utilization above which a move earns fill credit.
pub(crate) const HIGH_UTILIZATION: f64 = 0.95;

/// Remaining length below which a target counts as tightly fitted.
pub(crate) const TIGHT_FIT: f64 = 0.05;

/// Utilization above which a bin is left alone by the exchange phase.
pub(crate) const PERFECTLY_PACKED: f64 = 0.999;

const FILL_CREDIT: f64 = 10.0;
const WASTE_QUALITY_WEIGHT: f64 = 5.0;
const WASTE_QUALITY_MAX: f64 = 1.0;

/// How reusable a leftover of `remaining` length is.
///
/// Zero below one unit, rising linearly to the maximum at two units and flat after that.
pub(crate) fn waste_quality(remaining: f64) -> f64 {
    if remaining < 1.0 {
        0.0
    } else if remaining >= 2.0 {
        WASTE_QUALITY_MAX
    } else {
        (remaining - 1.0) * WASTE_QUALITY_MAX
    }
}

/// What a single-segment relocation does to its source and target bins.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MoveEffect {
    pub(crate) empties_source: bool,
    /// Source utilization before the move.
    pub(crate) source_utilization: f64,
    /// Target utilization after the move.
    pub(crate) target_utilization: f64,
    pub(crate) target_remaining_before: f64,
    pub(crate) target_remaining_after: f64,
}

/// Higher is better. Only moves scoring above zero are made.
pub(crate) fn move_score(effect: &MoveEffect) -> f64 {
    let mut score = 0.0;
    if effect.empties_source {
        score += EMPTY_SOURCE_BONUS;
    }

    let fills = effect.target_utilization > HIGH_UTILIZATION
        || effect.target_remaining_after < TIGHT_FIT;
    if fills && effect.target_utilization > effect.source_utilization {
        score += FILL_CREDIT;
    }

    score += WASTE_QUALITY_WEIGHT
        * (waste_quality(effect.target_remaining_after)
            - waste_quality(effect.target_remaining_before));
    score
}

/// Exchange objective of a pair of bins.
pub(crate) fn pair_fitness(first: f64, second: f64) -> f64 {
    first * first + second * second
}
