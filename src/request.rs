//! Cutting requests and their expansion into segments.

use crate::config::SolverConfig;
use crate::error::{Error, Result};
use fnv::FnvHashSet;
use tracing::debug;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A length of bar that needs to be produced, possibly longer than a standard bar.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct CuttingRequest {
    /// ID used by the caller to match segments back to this request.
    pub id: String,

    /// Required length. Requests longer than a standard bar are split with lap splices.
    pub raw_length: f64,

    /// Overlap needed at every splice of an oversized request.
    pub lap_length: f64,

    /// Number of identical pieces required.
    pub quantity: usize,

    /// Bar diameter. Requests of different diameters are never mixed on a bar.
    pub diameter: u32,

    /// Free-form label carried for the caller.
    pub group_label: Option<String>,
}

impl CuttingRequest {
    /// Creates a request with no lap, diameter 0 and no label.
    pub fn new(id: impl Into<String>, raw_length: f64, quantity: usize) -> Self {
        Self {
            id: id.into(),
            raw_length,
            lap_length: 0.0,
            quantity,
            diameter: 0,
            group_label: None,
        }
    }

    /// Sets the lap splice length.
    pub fn with_lap(mut self, lap_length: f64) -> Self {
        self.lap_length = lap_length;
        self
    }

    /// Sets the diameter.
    pub fn with_diameter(mut self, diameter: u32) -> Self {
        self.diameter = diameter;
        self
    }

    /// Sets the group label.
    pub fn with_group_label(mut self, label: impl Into<String>) -> Self {
        self.group_label = Some(label.into());
        self
    }

    /// Whether this request needs more than one standard bar.
    pub fn is_multi_bar(&self, standard_length: f64) -> bool {
        self.raw_length > standard_length
    }

    fn validate(&self, standard_length: f64) -> Result<()> {
        if !self.raw_length.is_finite() || self.raw_length <= 0.0 {
            return Err(Error::InvalidLength {
                request_id: self.id.clone(),
                length: self.raw_length,
            });
        }
        if !self.lap_length.is_finite() || self.lap_length < 0.0 {
            return Err(Error::InvalidLap {
                request_id: self.id.clone(),
                lap_length: self.lap_length,
            });
        }
        if self.lap_length >= standard_length {
            return Err(Error::LapTooLong {
                request_id: self.id.clone(),
                lap_length: self.lap_length,
                standard_length,
            });
        }
        Ok(())
    }
}

/// How one request is split across standard bars.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct SubBarPlan {
    /// Number of bars one piece of the request is made of.
    pub sub_bars_required: usize,

    /// Number of lap splices joining those bars.
    pub laps_required: usize,

    /// Material consumed by one piece, laps included.
    pub total_material_length: f64,

    /// Effective (non-overlapping) length contributed by each bar. Sums to the raw length.
    pub segment_lengths: Vec<f64>,

    /// Distance from the start of the piece at which each lap begins.
    pub lap_positions: Vec<f64>,

    /// Lap length applied at each splice.
    pub lap_length: f64,
}

impl SubBarPlan {
    /// Computes the split of `request` over bars of `standard_length`.
    ///
    /// Every bar but the last covers `standard_length - lap_length` of the run and carries the
    /// lap on top of it, so it consumes a whole bar. The last bar covers what is left.
    pub fn for_request(request: &CuttingRequest, standard_length: f64) -> Result<SubBarPlan> {
        if !standard_length.is_finite() || standard_length <= 0.0 {
            return Err(Error::InvalidStandardLength(standard_length));
        }
        request.validate(standard_length)?;

        if !request.is_multi_bar(standard_length) {
            return Ok(SubBarPlan {
                sub_bars_required: 1,
                laps_required: 0,
                total_material_length: request.raw_length,
                segment_lengths: vec![request.raw_length],
                lap_positions: Vec::new(),
                lap_length: 0.0,
            });
        }

        let lap = request.lap_length;
        let step = standard_length - lap;
        // The small bias keeps exact multiples from rounding up to an extra bar.
        let extra = ((request.raw_length - standard_length) / step - 1e-9).ceil() as usize;
        let sub_bars_required = extra + 1;
        let laps_required = sub_bars_required - 1;

        let mut segment_lengths = vec![step; laps_required];
        segment_lengths.push(request.raw_length - laps_required as f64 * step);

        let lap_positions = (1..sub_bars_required).map(|i| i as f64 * step).collect();

        Ok(SubBarPlan {
            sub_bars_required,
            laps_required,
            total_material_length: request.raw_length + laps_required as f64 * lap,
            segment_lengths,
            lap_positions,
            lap_length: lap,
        })
    }

    /// Space consumed in a bin by the segment at `index`.
    pub fn cutting_length(&self, index: usize) -> f64 {
        let effective = self.segment_lengths[index];
        if index + 1 < self.sub_bars_required {
            effective + self.lap_length
        } else {
            effective
        }
    }
}

/// One atomic piece to cut from a bar.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    /// Position of this segment in the derived list.
    pub segment_id: usize,

    /// ID of the request this segment comes from.
    pub parent_request_id: String,

    /// Which physical piece of the request (0-based, below its quantity) this segment belongs to.
    pub repetition: usize,

    /// Position of this segment within its piece.
    pub segment_index: usize,

    /// Space consumed in a bin.
    pub cutting_length: f64,

    /// Length contributed to the finished piece.
    pub effective_length: f64,

    /// Lap carried by this segment. Zero on the last segment of a split piece.
    pub lap_length: f64,

    /// Whether this segment is part of a request split over several bars.
    pub is_from_multi_bar: bool,
}

impl Segment {
    /// Creates a stand-alone segment with no lap.
    pub fn new(segment_id: usize, parent_request_id: impl Into<String>, length: f64) -> Self {
        Self {
            segment_id,
            parent_request_id: parent_request_id.into(),
            repetition: 0,
            segment_index: 0,
            cutting_length: length,
            effective_length: length,
            lap_length: 0.0,
            is_from_multi_bar: false,
        }
    }

    /// Whether `self` and `other` were split from the same request and therefore must not share
    /// a bar. Applies across all pieces of the request, not only within one.
    pub fn conflicts_with(&self, other: &Segment) -> bool {
        self.is_from_multi_bar
            && other.is_from_multi_bar
            && self.segment_id != other.segment_id
            && self.parent_request_id == other.parent_request_id
    }
}

/// Expands requests into segments, one instance per physical piece and sub-bar.
///
/// All requests are validated before anything is produced. The output order is request order,
/// then repetition, then position within the piece, so repeated calls give identical lists.
pub fn derive_segments(requests: &[CuttingRequest], config: &SolverConfig) -> Result<Vec<Segment>> {
    config.validate()?;

    let plans = requests
        .iter()
        .map(|request| SubBarPlan::for_request(request, config.standard_length))
        .collect::<Result<Vec<_>>>()?;

    let mut segments = Vec::with_capacity(
        requests
            .iter()
            .zip(&plans)
            .map(|(r, p)| r.quantity * p.sub_bars_required)
            .sum(),
    );

    for (request, plan) in requests.iter().zip(&plans) {
        let is_from_multi_bar = plan.sub_bars_required > 1;
        for repetition in 0..request.quantity {
            for (segment_index, &effective_length) in plan.segment_lengths.iter().enumerate() {
                let cutting_length = plan.cutting_length(segment_index);
                segments.push(Segment {
                    segment_id: segments.len(),
                    parent_request_id: request.id.clone(),
                    repetition,
                    segment_index,
                    cutting_length,
                    effective_length,
                    lap_length: cutting_length - effective_length,
                    is_from_multi_bar,
                });
            }
        }
    }

    debug!(
        requests = requests.len(),
        segments = segments.len(),
        "derived segments"
    );

    Ok(segments)
}

/// Checks that every segment fits on a standard bar.
pub(crate) fn check_segments(segments: &[Segment], config: &SolverConfig) -> Result<()> {
    config.validate()?;
    let mut seen: FnvHashSet<usize> = Default::default();
    for segment in segments {
        if !seen.insert(segment.segment_id) {
            return Err(Error::DuplicateSegment(segment.segment_id));
        }
        let length = segment.cutting_length;
        if !length.is_finite() || length <= 0.0 {
            return Err(Error::InvalidLength {
                request_id: segment.parent_request_id.clone(),
                length,
            });
        }
        if !config.fits(length, config.standard_length) {
            return Err(Error::SegmentTooLong {
                segment_id: segment.segment_id,
                cutting_length: length,
                capacity: config.standard_length,
            });
        }
    }
    Ok(())
}
