//! Position mapping across document revisions.
//!
//! Every applied transaction records a [`StepMap`] describing how it shifted
//! top-level block indices. Node references and insertion gaps taken at an
//! older revision are carried forward through the maps recorded since.

use std::collections::VecDeque;

/// One structural change to the top-level block list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// `count` blocks inserted at gap `at`.
    Insert { at: usize, count: usize },
    /// Blocks `start..end` removed.
    Delete { start: usize, end: usize },
}

/// The structural steps of one transaction, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepMap {
    steps: Vec<Step>,
}

impl StepMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        match step {
            Step::Insert { count: 0, .. } => {}
            Step::Delete { start, end } if start >= end => {}
            step => self.steps.push(step),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    /// Map the index of an existing block. `None` if the block was deleted.
    pub fn map_index(&self, index: usize) -> Option<usize> {
        self.steps
            .iter()
            .try_fold(index, |index, step| map_index_step(*step, index))
    }

    /// Map an insertion gap. Gaps inside a deleted range collapse to its
    /// start; a gap at an insertion point moves past the inserted blocks.
    pub fn map_gap(&self, gap: usize) -> usize {
        self.steps
            .iter()
            .fold(gap, |gap, step| map_gap_step(*step, gap))
    }
}

fn map_index_step(step: Step, index: usize) -> Option<usize> {
    match step {
        Step::Insert { at, count } if index >= at => Some(index + count),
        Step::Insert { .. } => Some(index),
        Step::Delete { start, .. } if index < start => Some(index),
        Step::Delete { end, .. } if index < end => None,
        Step::Delete { start, end } => Some(index - (end - start)),
    }
}

fn map_gap_step(step: Step, gap: usize) -> usize {
    match step {
        Step::Insert { at, count } if gap >= at => gap + count,
        Step::Insert { .. } => gap,
        Step::Delete { start, .. } if gap <= start => gap,
        Step::Delete { start, end } if gap < end => start,
        Step::Delete { start, end } => gap - (end - start),
    }
}

/// Why a position could not be carried to the current revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unmapped {
    /// The node was deleted.
    Deleted,
    /// The revision is older than the retained log, or newer than the
    /// document.
    OutOfRange,
}

/// Bounded log of the step maps of recent revisions.
#[derive(Debug, Clone)]
pub struct MapLog {
    /// `(revision produced, map)`, oldest first.
    maps: VecDeque<(u64, StepMap)>,
    capacity: usize,
}

impl MapLog {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        Self {
            maps: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    /// Record the map of the transaction that produced `revision`.
    pub fn record(&mut self, revision: u64, map: StepMap) {
        self.maps.push_back((revision, map));
        while self.maps.len() > self.capacity {
            self.maps.pop_front();
        }
    }

    /// Maps that lead from `from` to `current`, oldest first.
    fn since(&self, from: u64, current: u64) -> Result<impl Iterator<Item = &StepMap>, Unmapped> {
        if from > current {
            return Err(Unmapped::OutOfRange);
        }
        let oldest_base = current.saturating_sub(self.maps.len() as u64);
        if from < oldest_base {
            return Err(Unmapped::OutOfRange);
        }
        Ok(self
            .maps
            .iter()
            .filter(move |(rev, _)| *rev > from)
            .map(|(_, map)| map))
    }

    pub fn map_index(&self, from: u64, current: u64, index: usize) -> Result<usize, Unmapped> {
        self.since(from, current)?
            .try_fold(index, |index, map| map.map_index(index))
            .ok_or(Unmapped::Deleted)
    }

    pub fn map_gap(&self, from: u64, current: u64, gap: usize) -> Result<usize, Unmapped> {
        Ok(self
            .since(from, current)?
            .fold(gap, |gap, map| map.map_gap(gap)))
    }
}

impl Default for MapLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(steps: &[Step]) -> StepMap {
        let mut map = StepMap::new();
        steps.iter().for_each(|s| map.push(*s));
        map
    }

    #[test]
    fn test_insert_shifts_later_indices() {
        let m = map(&[Step::Insert { at: 2, count: 3 }]);
        assert_eq!(m.map_index(1), Some(1));
        assert_eq!(m.map_index(2), Some(5));
        assert_eq!(m.map_gap(2), 5);
        assert_eq!(m.map_gap(1), 1);
    }

    #[test]
    fn test_delete_removes_and_shifts() {
        let m = map(&[Step::Delete { start: 1, end: 3 }]);
        assert_eq!(m.map_index(0), Some(0));
        assert_eq!(m.map_index(1), None);
        assert_eq!(m.map_index(2), None);
        assert_eq!(m.map_index(3), Some(1));
        assert_eq!(m.map_gap(2), 1);
        assert_eq!(m.map_gap(4), 2);
    }

    #[test]
    fn test_empty_steps_are_dropped() {
        let m = map(&[Step::Insert { at: 0, count: 0 }, Step::Delete { start: 2, end: 2 }]);
        assert!(m.is_identity());
    }

    #[test]
    fn test_log_maps_across_revisions() {
        let mut log = MapLog::default();
        log.record(1, map(&[Step::Insert { at: 0, count: 1 }]));
        log.record(2, StepMap::new());
        log.record(3, map(&[Step::Delete { start: 0, end: 1 }]));

        // index 4 at revision 0 -> 5 after the insert -> 4 after the delete
        assert_eq!(log.map_index(0, 3, 4), Ok(4));
        // block 0 at revision 1 is the inserted one, deleted at revision 3
        assert_eq!(log.map_index(1, 3, 0), Err(Unmapped::Deleted));
        assert_eq!(log.map_index(3, 3, 7), Ok(7));
        assert_eq!(log.map_index(4, 3, 0), Err(Unmapped::OutOfRange));
    }

    #[test]
    fn test_log_is_bounded() {
        let mut log = MapLog::new(2);
        for rev in 1..=5 {
            log.record(rev, StepMap::new());
        }
        assert_eq!(log.map_index(3, 5, 0), Ok(0));
        assert_eq!(log.map_index(2, 5, 0), Err(Unmapped::OutOfRange));
    }
}
