//! Bin bookkeeping for the swap optimizer.

use crate::bin::WorkBin;
use crate::config::SolverConfig;
use crate::offcut::OffcutPiece;
use crate::request::Segment;
use crate::result::BarOrigin;
use std::cmp::Ordering;

/// Where a relocated segment goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Target {
    /// An open bin, by index.
    Bin(usize),
    /// An offcut not opened yet, by index into the spares.
    Spare(usize),
}

/// Open bins plus the offcuts still in stock.
///
/// Emptied bins stay in place until [`BinManager::drop_empty`] so indices are stable within a
/// phase. An offcut bin that is emptied and dropped goes back to stock, not to the spares.
#[derive(Clone, Debug)]
pub(crate) struct BinManager<'a> {
    bins: Vec<WorkBin<'a>>,
    spares: Vec<WorkBin<'a>>,
}

impl<'a> BinManager<'a> {
    pub(crate) fn new(bins: Vec<WorkBin<'a>>, spares: Vec<WorkBin<'a>>) -> Self {
        BinManager { bins, spares }
    }

    /// Wraps an initial packing, keeping the offcuts it left unopened as spares.
    pub(crate) fn from_packing(bins: Vec<WorkBin<'a>>, offcuts: &[&OffcutPiece]) -> Self {
        let spares = offcuts
            .iter()
            .filter(|offcut| {
                !bins.iter().any(|bin| match bin.origin() {
                    BarOrigin::Offcut { offcut_id, .. } => *offcut_id == offcut.id,
                    BarOrigin::NewBar => false,
                })
            })
            .map(|offcut| WorkBin::from_offcut(offcut))
            .collect();
        Self::new(bins, spares)
    }

    pub(crate) fn bins(&self) -> &[WorkBin<'a>] {
        &self.bins
    }

    pub(crate) fn bin(&self, index: usize) -> &WorkBin<'a> {
        &self.bins[index]
    }

    pub(crate) fn spares(&self) -> &[WorkBin<'a>] {
        &self.spares
    }

    /// Non-empty standard bars.
    pub(crate) fn bar_count(&self) -> usize {
        self.bins
            .iter()
            .filter(|bin| !bin.is_empty() && !bin.is_offcut())
            .count()
    }

    /// Leftover across all non-empty bins.
    pub(crate) fn total_waste(&self) -> f64 {
        self.bins
            .iter()
            .filter(|bin| !bin.is_empty())
            .map(|bin| bin.remaining().max(0.0))
            .sum()
    }

    pub(crate) fn has_single_segment_bins(&self) -> bool {
        self.bins.iter().any(|bin| bin.len() == 1)
    }

    /// Bin indices by ascending segment count, index order for ties. Empty bins are skipped.
    pub(crate) fn by_segment_count(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.bins.len())
            .filter(|&i| !self.bins[i].is_empty())
            .collect();
        order.sort_by_key(|&i| self.bins[i].len());
        order
    }

    /// Index of the bin holding `segment_id`.
    pub(crate) fn locate(&self, segment_id: usize) -> Option<usize> {
        self.bins
            .iter()
            .position(|bin| bin.segments().any(|s| s.segment.segment_id == segment_id))
    }

    fn target(&self, target: Target) -> &WorkBin<'a> {
        match target {
            Target::Bin(i) => &self.bins[i],
            Target::Spare(i) => &self.spares[i],
        }
    }

    /// Every place other than bin `from` that can take `segment`, open bins first.
    pub(crate) fn targets_for(
        &self,
        segment: &Segment,
        from: usize,
        include_spares: bool,
        config: &SolverConfig,
    ) -> Vec<Target> {
        let open = (0..self.bins.len())
            .filter(|&i| i != from && !self.bins[i].is_empty())
            .filter(|&i| self.bins[i].can_accept(segment, config))
            .map(Target::Bin);
        let spares = (0..self.spares.len())
            .filter(|_| include_spares)
            .filter(|&i| self.spares[i].can_accept(segment, config))
            .map(Target::Spare);
        open.chain(spares).collect()
    }

    /// The target among [`targets_for`](Self::targets_for) left with the least room.
    pub(crate) fn best_fit(
        &self,
        segment: &Segment,
        from: usize,
        config: &SolverConfig,
    ) -> Option<Target> {
        self.targets_for(segment, from, false, config)
            .into_iter()
            .map(|t| (t, self.target(t).remaining()))
            .fold(None, |best, (target, remaining)| match best {
                Some((_, best_remaining)) if best_remaining <= remaining => best,
                _ => Some((target, remaining)),
            })
            .map(|(target, _)| target)
    }

    /// Remaining room and utilization of `target` if `segment` were added.
    pub(crate) fn after_insert(&self, target: Target, segment: &Segment) -> (f64, f64, f64) {
        let bin = self.target(target);
        let before = bin.remaining();
        let after = before - segment.cutting_length;
        let utilization = if bin.capacity() > 0.0 {
            ((bin.used() + segment.cutting_length) / bin.capacity()).min(1.0)
        } else {
            0.0
        };
        (before, after, utilization)
    }

    /// Moves `segment_id` out of bin `from` into `to`. Returns the bin index it landed in.
    ///
    /// A spare target is opened and appended to the bins.
    pub(crate) fn relocate(&mut self, segment_id: usize, from: usize, to: Target) -> Option<usize> {
        let segment = self.bins[from].remove_segment(segment_id)?;
        match to {
            Target::Bin(i) => {
                self.bins[i].push(segment);
                Some(i)
            }
            Target::Spare(i) => {
                let mut bin = self.spares.remove(i);
                bin.push(segment);
                self.bins.push(bin);
                Some(self.bins.len() - 1)
            }
        }
    }

    /// Swaps two segments between bins.
    pub(crate) fn exchange(&mut self, first: (usize, usize), second: (usize, usize)) -> bool {
        let (first_bin, first_id) = first;
        let (second_bin, second_id) = second;
        let Some(a) = self.bins[first_bin].remove_segment(first_id) else {
            return false;
        };
        let Some(b) = self.bins[second_bin].remove_segment(second_id) else {
            self.bins[first_bin].push(a);
            return false;
        };
        self.bins[first_bin].push(b);
        self.bins[second_bin].push(a);
        true
    }

    pub(crate) fn snapshot(&self) -> Vec<WorkBin<'a>> {
        self.bins.clone()
    }

    pub(crate) fn restore(&mut self, bins: Vec<WorkBin<'a>>) {
        self.bins = bins;
    }

    pub(crate) fn drop_empty(&mut self) {
        self.bins.retain(|bin| !bin.is_empty());
    }

    /// The non-empty bins.
    pub(crate) fn into_bins(mut self) -> Vec<WorkBin<'a>> {
        self.drop_empty();
        self.bins
    }
}

/// Compares two (bars, waste) snapshots, fewer bars first.
pub(crate) fn compare_state(a: (usize, f64), b: (usize, f64), epsilon: f64) -> Ordering {
    a.0.cmp(&b.0).then_with(|| {
        if (a.1 - b.1).abs() <= epsilon {
            Ordering::Equal
        } else {
            a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocate_into_spare_opens_it() {
        let config = SolverConfig::default();
        let segments = [Segment::new(0, "A", 2.5), Segment::new(1, "B", 9.0)];
        let mut bar = WorkBin::new_bar(12.0);
        bar.push(&segments[0]);
        let mut other = WorkBin::new_bar(12.0);
        other.push(&segments[1]);
        let offcut = OffcutPiece::new("O", 3.0);
        let mut manager = BinManager::new(vec![bar, other], vec![WorkBin::from_offcut(&offcut)]);

        let targets = manager.targets_for(&segments[0], 0, true, &config);
        assert_eq!(targets, vec![Target::Bin(1), Target::Spare(0)]);
        assert_eq!(manager.best_fit(&segments[0], 0, &config), Some(Target::Bin(1)));

        assert_eq!(manager.relocate(0, 0, Target::Spare(0)), Some(2));
        assert!(manager.spares().is_empty());
        assert_eq!(manager.bar_count(), 1);
        assert_eq!(manager.locate(0), Some(2));

        let bins = manager.into_bins();
        assert_eq!(bins.len(), 2);
        assert!(bins[1].is_offcut());
    }

    #[test]
    fn from_packing_keeps_unopened_offcuts() {
        let segments = [Segment::new(0, "A", 2.0)];
        let used = OffcutPiece::new("used", 2.0);
        let spare = OffcutPiece::new("spare", 5.0);
        let mut bin = WorkBin::from_offcut(&used);
        bin.push(&segments[0]);

        let manager = BinManager::from_packing(vec![bin], &[&used, &spare]);
        assert_eq!(manager.spares().len(), 1);
        assert_eq!(manager.spares()[0].capacity(), 5.0);
        assert_eq!(manager.bar_count(), 0);
    }

    #[test]
    fn exchange_swaps_segments() {
        let segments = [Segment::new(0, "A", 4.0), Segment::new(1, "B", 5.0)];
        let mut first = WorkBin::new_bar(12.0);
        first.push(&segments[0]);
        let mut second = WorkBin::new_bar(12.0);
        second.push(&segments[1]);
        let mut manager = BinManager::new(vec![first, second], Vec::new());

        assert!(manager.exchange((0, 0), (1, 1)));
        assert_eq!(manager.locate(0), Some(1));
        assert_eq!(manager.locate(1), Some(0));
        assert!((manager.bin(0).used() - 5.0).abs() < 1e-9);
    }
}
