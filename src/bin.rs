use crate::config::SolverConfig;
use crate::offcut::OffcutPiece;
use crate::request::Segment;
use crate::result::{BarOrigin, CuttingPattern, PatternCut, PlacedSegment};

/// A segment placed at a position along a bin.
#[derive(Clone, Debug)]
pub(crate) struct UsedSegment<'a> {
    pub(crate) segment: &'a Segment,
    pub(crate) start: f64,
    pub(crate) end: f64,
}

impl<'a> UsedSegment<'a> {
    pub(crate) fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// A standard bar or an offcut being filled during packing.
#[derive(Clone, Debug)]
pub(crate) struct WorkBin<'a> {
    capacity: f64,
    used: f64,
    segments: Vec<UsedSegment<'a>>,
    origin: BarOrigin,
}

impl<'a> WorkBin<'a> {
    /// Creates an empty standard bar.
    pub(crate) fn new_bar(capacity: f64) -> Self {
        WorkBin {
            capacity,
            used: 0.0,
            segments: Default::default(),
            origin: BarOrigin::NewBar,
        }
    }

    /// Creates an empty bin backed by an offcut.
    pub(crate) fn from_offcut(offcut: &OffcutPiece) -> Self {
        WorkBin {
            capacity: offcut.length,
            used: 0.0,
            segments: Default::default(),
            origin: BarOrigin::Offcut {
                offcut_id: offcut.id.clone(),
                source_id: offcut.source_id.clone(),
            },
        }
    }

    pub(crate) fn capacity(&self) -> f64 {
        self.capacity
    }

    pub(crate) fn remaining(&self) -> f64 {
        self.capacity - self.used
    }

    pub(crate) fn used(&self) -> f64 {
        self.used
    }

    pub(crate) fn origin(&self) -> &BarOrigin {
        &self.origin
    }

    pub(crate) fn is_offcut(&self) -> bool {
        matches!(self.origin, BarOrigin::Offcut { .. })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.segments.len()
    }

    /// Share of the capacity in use, from 0.0 to 1.0.
    pub(crate) fn utilization(&self) -> f64 {
        if self.capacity > 0.0 {
            (self.used / self.capacity).min(1.0)
        } else {
            0.0
        }
    }

    /// Returns an iterator over the placed segments.
    pub(crate) fn segments(&self) -> std::slice::Iter<'_, UsedSegment<'a>> {
        self.segments.iter()
    }

    /// Whether a segment of the same split piece is already in this bin.
    pub(crate) fn conflicts_with(&self, segment: &Segment) -> bool {
        self.segments.iter().any(|s| s.segment.conflicts_with(segment))
    }

    /// Whether `segment` fits and does not conflict with anything in this bin.
    pub(crate) fn can_accept(&self, segment: &Segment, config: &SolverConfig) -> bool {
        config.fits(segment.cutting_length, self.remaining()) && !self.conflicts_with(segment)
    }

    /// Insert segment in bin if it is accepted. Returns `true` if inserted.
    pub(crate) fn insert_segment(&mut self, segment: &'a Segment, config: &SolverConfig) -> bool {
        if !self.can_accept(segment, config) {
            return false;
        }
        self.push(segment);
        true
    }

    /// Appends `segment` without any check.
    pub(crate) fn push(&mut self, segment: &'a Segment) {
        let start = self.insertion_point();
        self.segments.push(UsedSegment {
            segment,
            start,
            end: start + segment.cutting_length,
        });
        self.used += segment.cutting_length;
    }

    /// Removes the segment with `segment_id`, returning it if present.
    pub(crate) fn remove_segment(&mut self, segment_id: usize) -> Option<&'a Segment> {
        let index = self
            .segments
            .iter()
            .position(|s| s.segment.segment_id == segment_id)?;
        let removed = self.segments.remove(index);
        self.compact();
        Some(removed.segment)
    }

    /// Where the next segment starts.
    fn insertion_point(&self) -> f64 {
        self.segments.last().map_or(0.0, |s| s.end)
    }

    /// Push segments to one side to close the gaps left by removals.
    fn compact(&mut self) {
        let mut prev_end = 0.0;
        for used in self.segments.iter_mut() {
            let length = used.length();
            used.start = prev_end;
            used.end = prev_end + length;
            prev_end = used.end;
        }
        self.used = prev_end;
    }

    /// Freezes this bin into a pattern.
    pub(crate) fn into_pattern(self, id: usize) -> CuttingPattern {
        let mut cuts: Vec<PatternCut> = Vec::new();
        for used in &self.segments {
            let segment = used.segment;
            match cuts.iter_mut().find(|cut| {
                cut.cutting_length == segment.cutting_length
                    && cut.effective_length == segment.effective_length
            }) {
                Some(cut) => cut.count += 1,
                None => cuts.push(PatternCut {
                    cutting_length: segment.cutting_length,
                    effective_length: segment.effective_length,
                    lap_length: segment.lap_length,
                    count: 1,
                }),
            }
        }

        CuttingPattern {
            id,
            waste: self.remaining().max(0.0),
            utilization: self.utilization(),
            bar_length: self.capacity,
            origin: self.origin,
            cuts,
            segments: self
                .segments
                .into_iter()
                .map(|used| PlacedSegment {
                    segment_id: used.segment.segment_id,
                    parent_request_id: used.segment.parent_request_id.clone(),
                    repetition: used.segment.repetition,
                    segment_index: used.segment.segment_index,
                    effective_length: used.segment.effective_length,
                    is_from_multi_bar: used.segment.is_from_multi_bar,
                    start: used.start,
                    end: used.end,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::CuttingRequest;

    fn segments() -> Vec<Segment> {
        (0..4).map(|i| Segment::new(i, format!("R{i}"), 2.5)).collect()
    }

    #[test]
    fn insert_tracks_positions() {
        let config = SolverConfig::default();
        let segments = segments();
        let mut bin = WorkBin::new_bar(12.0);
        segments.iter().for_each(|s| {
            assert!(bin.insert_segment(s, &config));
        });

        assert_eq!(bin.len(), 4);
        assert!((bin.remaining() - 2.0).abs() < 1e-9);
        let ends: Vec<f64> = bin.segments().map(|s| s.end).collect();
        assert_eq!(ends, vec![2.5, 5.0, 7.5, 10.0]);
    }

    #[test]
    fn remove_compacts() {
        let config = SolverConfig::default();
        let segments = segments();
        let mut bin = WorkBin::new_bar(12.0);
        segments.iter().for_each(|s| {
            bin.insert_segment(s, &config);
        });

        assert_eq!(bin.remove_segment(1).map(|s| s.segment_id), Some(1));
        assert_eq!(bin.remove_segment(1), None);
        assert_eq!(bin.segments().nth(1).unwrap().segment.segment_id, 2);
        assert_eq!(bin.segments().nth(1).unwrap().start, 2.5);
        assert!((bin.used() - 7.5).abs() < 1e-9);
    }

    #[test]
    fn rejects_overflow_and_conflicts() {
        let config = SolverConfig::default();
        let big = Segment::new(0, "A", 10.0);
        let small = Segment::new(1, "B", 2.5);
        let mut bin = WorkBin::new_bar(12.0);
        assert!(bin.insert_segment(&big, &config));
        assert!(!bin.insert_segment(&small, &config));

        let pieces = crate::request::derive_segments(
            &[CuttingRequest::new("L", 13.0, 1).with_lap(0.0)],
            &SolverConfig::default().with_standard_length(12.0),
        )
        .unwrap();
        let mut bin = WorkBin::new_bar(24.0);
        assert!(bin.insert_segment(&pieces[0], &config));
        assert!(bin.conflicts_with(&pieces[1]));
        assert!(!bin.insert_segment(&pieces[1], &config));
    }

    #[test]
    fn pattern_groups_equal_cuts() {
        let config = SolverConfig::default();
        let segments = segments();
        let offcut = OffcutPiece::new("O1", 6.0).with_source("job-7");
        let mut bin = WorkBin::from_offcut(&offcut);
        bin.insert_segment(&segments[0], &config);
        bin.insert_segment(&segments[1], &config);

        let pattern = bin.into_pattern(3);
        assert_eq!(pattern.id, 3);
        assert_eq!(pattern.cuts.len(), 1);
        assert_eq!(pattern.cuts[0].count, 2);
        assert!((pattern.waste - 1.0).abs() < 1e-9);
        assert!(matches!(
            pattern.origin,
            BarOrigin::Offcut { ref offcut_id, .. } if offcut_id == "O1"
        ));
    }
}
