use thiserror::Error;

/// Error while preparing an optimization.
///
/// Only malformed input produces an error. Search budgets never do; a solver that runs out of
/// budget returns its best solution tagged with [`SolveStatus::BudgetExhausted`].
///
/// [`SolveStatus::BudgetExhausted`]: crate::SolveStatus::BudgetExhausted
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The standard bar length is not a positive, finite number.
    #[error("standard bar length must be positive and finite, got {0}")]
    InvalidStandardLength(f64),

    /// A request has a non-positive or non-finite length.
    #[error("request {request_id}: length must be positive and finite, got {length}")]
    InvalidLength {
        /// ID of the offending request.
        request_id: String,
        /// The rejected length.
        length: f64,
    },

    /// A request has a negative or non-finite lap length.
    #[error("request {request_id}: lap length must be non-negative and finite, got {lap_length}")]
    InvalidLap {
        /// ID of the offending request.
        request_id: String,
        /// The rejected lap length.
        lap_length: f64,
    },

    /// The lap would consume a whole standard bar, so an oversized request could never be split.
    #[error(
        "request {request_id}: lap length {lap_length} must be shorter than the standard bar length {standard_length}"
    )]
    LapTooLong {
        /// ID of the offending request.
        request_id: String,
        /// The rejected lap length.
        lap_length: f64,
        /// Standard bar length in effect.
        standard_length: f64,
    },

    /// An offcut has a non-positive or non-finite length.
    #[error("offcut {offcut_id}: length must be positive and finite, got {length}")]
    InvalidOffcut {
        /// ID of the offending offcut.
        offcut_id: String,
        /// The rejected length.
        length: f64,
    },

    /// Two segments handed to a solver share an ID.
    #[error("segment ID {0} appears more than once")]
    DuplicateSegment(usize),

    /// A segment handed to a solver is longer than a standard bar.
    #[error("segment {segment_id}: cutting length {cutting_length} exceeds bar capacity {capacity}")]
    SegmentTooLong {
        /// ID of the offending segment.
        segment_id: usize,
        /// Space the segment needs in a bar.
        cutting_length: f64,
        /// Standard bar length in effect.
        capacity: f64,
    },
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
