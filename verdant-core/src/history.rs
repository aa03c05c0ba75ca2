//! Bounded linear undo/redo.
//!
//! ```text
//!   past (oldest first)        present        future (nearest first)
//!   [s0, s1, s2]  ◄── undo ──   s3   ── redo ──►  [s4, s5]
//! ```
//!
//! Only [`HistoryManager::record`] creates a checkpoint. Changes that did not
//! originate locally go through [`HistoryManager::rebase`], which rewrites
//! every frame instead, so stepping through history never reverts them.

use std::collections::VecDeque;

/// Checkpoints kept when no limit is configured.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct HistoryManager<T> {
    past: VecDeque<T>,
    present: T,
    future: VecDeque<T>,
    limit: usize,
}

impl<T: Clone + PartialEq> HistoryManager<T> {
    pub fn new(initial: T, limit: usize) -> Self {
        Self {
            past: VecDeque::with_capacity(limit.min(64)),
            present: initial,
            future: VecDeque::new(),
            limit,
        }
    }

    pub fn present(&self) -> &T {
        &self.present
    }

    /// Checkpoint `present` and move to `next`.
    ///
    /// Returns `false` (and records nothing) when `next` equals `present`.
    pub fn record(&mut self, next: T) -> bool {
        if next == self.present {
            return false;
        }
        let previous = std::mem::replace(&mut self.present, next);
        self.push_past(previous);
        self.future.clear();
        true
    }

    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.past.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, previous);
        self.future.push_front(current);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop_front() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, next);
        self.push_past(current);
        true
    }

    /// Swap `present` without creating a checkpoint. Past and future are
    /// left as they are.
    pub fn replace_present(&mut self, next: T) {
        self.present = next;
    }

    /// Run `change` over every frame, then collapse frames that became
    /// identical to their neighbour.
    pub fn rebase(&mut self, mut change: impl FnMut(&mut T)) {
        self.past.iter_mut().for_each(&mut change);
        change(&mut self.present);
        self.future.iter_mut().for_each(&mut change);

        self.past = collapse(std::mem::take(&mut self.past));
        while self.past.back() == Some(&self.present) {
            self.past.pop_back();
        }
        self.future = collapse(std::mem::take(&mut self.future));
        while self.future.front() == Some(&self.present) {
            self.future.pop_front();
        }
    }

    /// Start over from `initial` with no history.
    pub fn reset(&mut self, initial: T) {
        self.past.clear();
        self.future.clear();
        self.present = initial;
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn push_past(&mut self, frame: T) {
        self.past.push_back(frame);
        while self.past.len() > self.limit {
            self.past.pop_front();
        }
    }
}

fn collapse<T: PartialEq>(frames: VecDeque<T>) -> VecDeque<T> {
    let mut out: VecDeque<T> = VecDeque::with_capacity(frames.len());
    for frame in frames {
        if out.back() != Some(&frame) {
            out.push_back(frame);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undo_redo_roundtrip() {
        let mut h = HistoryManager::new(0, 10);
        assert!(h.record(1));
        assert!(h.record(2));

        assert!(h.undo());
        assert_eq!(*h.present(), 1);
        assert!(h.redo());
        assert_eq!(*h.present(), 2);
    }

    #[test]
    fn test_empty_stacks_are_noops() {
        let mut h = HistoryManager::new("a", 5);
        assert!(!h.undo());
        assert!(!h.redo());
        assert_eq!(*h.present(), "a");
    }

    #[test]
    fn test_identical_state_not_recorded() {
        let mut h = HistoryManager::new(1, 5);
        assert!(!h.record(1));
        assert_eq!(h.past_len(), 0);
    }

    #[test]
    fn test_limit_discards_oldest() {
        let mut h = HistoryManager::new(0, 3);
        for i in 1..=7 {
            h.record(i);
            assert!(h.past_len() <= 3);
        }
        assert_eq!(h.past_len(), 3);
        while h.undo() {}
        assert_eq!(*h.present(), 4);
    }

    #[test]
    fn test_redo_respects_limit() {
        let mut h = HistoryManager::new(0, 2);
        h.record(1);
        h.record(2);
        h.undo();
        h.undo();
        h.record(10);
        h.record(11);
        h.undo();
        h.redo();
        assert!(h.past_len() <= 2);
    }

    #[test]
    fn test_record_clears_future() {
        let mut h = HistoryManager::new(0, 5);
        h.record(1);
        h.undo();
        assert!(h.can_redo());
        h.record(5);
        assert!(!h.can_redo());
        assert!(!h.redo());
        assert_eq!(*h.present(), 5);
    }

    #[test]
    fn test_replace_present_is_not_a_checkpoint() {
        let mut h = HistoryManager::new(0, 5);
        h.record(1);
        h.replace_present(7);
        assert_eq!(h.past_len(), 1);
        h.undo();
        assert_eq!(*h.present(), 0);
    }

    #[test]
    fn test_rebase_rewrites_all_frames() {
        let mut h = HistoryManager::new(vec![1], 5);
        h.record(vec![1, 2]);
        h.record(vec![1, 2, 3]);
        h.undo();

        h.rebase(|frame| frame.push(9));
        assert_eq!(*h.present(), vec![1, 2, 9]);
        h.undo();
        assert_eq!(*h.present(), vec![1, 9]);
        h.redo();
        h.redo();
        assert_eq!(*h.present(), vec![1, 2, 3, 9]);
    }

    #[test]
    fn test_rebase_collapses_equal_frames() {
        let mut h = HistoryManager::new(vec![0], 5);
        h.record(vec![0, 9]);
        // Remote removal of 9 makes the checkpoint equal to the present.
        h.rebase(|frame| frame.retain(|v| *v != 9));
        assert!(!h.can_undo());
        assert_eq!(*h.present(), vec![0]);
    }

    #[test]
    fn test_reset() {
        let mut h = HistoryManager::new(0, 5);
        h.record(1);
        h.record(2);
        h.undo();
        h.reset(100);
        assert_eq!(*h.present(), 100);
        assert!(!h.can_undo());
        assert!(!h.can_redo());
    }

    #[test]
    fn test_zero_limit_keeps_no_past() {
        let mut h = HistoryManager::new(0, 0);
        assert!(h.record(1));
        assert!(!h.undo());
        assert_eq!(*h.present(), 1);
    }
}
