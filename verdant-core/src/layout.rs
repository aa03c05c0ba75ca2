//! Deterministic placement of nodes that arrive without a position.
//!
//! Columns are tree levels, rows are the order in which nodes of that level
//! were seen:
//! ```text
//!   level 0      level 1      level 2
//!   (0, 0)       (250, 0)     (500, 0)
//!   (0, 100)     (250, 100)
//! ```
//! The same input always yields the same positions, so a retried snapshot
//! load or a replayed operation lands nodes exactly where they were.

use rustc_hash::FxHashMap;

use crate::{Component, Position};

/// Horizontal distance between levels.
pub const X_OFFSET: f64 = 250.0;
/// Vertical distance between siblings of one level.
pub const Y_SPACING: f64 = 100.0;

pub fn position_for(level: u32, index: usize) -> Position {
    Position::new(f64::from(level) * X_OFFSET, index as f64 * Y_SPACING)
}

/// Give every unplaced node the slot of its occurrence within its level.
pub fn assign_positions(nodes: &mut [Component]) {
    let mut seen: FxHashMap<u32, usize> = FxHashMap::default();
    for node in nodes.iter_mut() {
        let index = seen.entry(node.depth()).or_insert(0);
        if node.position.is_none() {
            node.position = Some(position_for(node.depth(), *index));
        }
        *index += 1;
    }
}

/// Slot for one more node at `level`, after those already in `nodes`.
///
/// Starts at the occurrence index and moves down past any occupied slot,
/// which happens after a sibling above was deleted.
pub fn next_position(nodes: &[Component], level: u32) -> Position {
    let mut index = nodes.iter().filter(|n| n.depth() == level).count();
    loop {
        let candidate = position_for(level, index);
        if !nodes.iter().any(|n| n.position == Some(candidate)) {
            return candidate;
        }
        index += 1;
    }
}
