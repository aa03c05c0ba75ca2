//! The reconciliation step shared by remote patches and local edits.
//!
//! Rules:
//! - creates upsert by id, so a duplicated or echoed create is harmless
//! - deletes of an absent id leave the collection untouched
//! - [`Operation::Ignored`] is a no-op
//!
//! Together these make replaying any operation twice equivalent to once.

use crate::layout;
use crate::{GraphState, Operation};

/// `(state, op) -> state'`. The input is left untouched.
pub fn apply(state: &GraphState, op: &Operation) -> GraphState {
    let mut next = state.clone();
    apply_mut(&mut next, op);
    next
}

/// Same rules as [`apply`], on a state the caller owns outright.
pub fn apply_mut(state: &mut GraphState, op: &Operation) {
    match op {
        Operation::CreateNode(node) => {
            let mut node = node.clone();
            node.normalize();
            match state.nodes.iter_mut().find(|n| n.id == node.id) {
                Some(existing) => existing.merge_from(node),
                None => {
                    if node.position.is_none() {
                        node.position = Some(layout::next_position(&state.nodes, node.depth()));
                    }
                    state.nodes.push(node);
                }
            }
        }
        Operation::DeleteNode { id } => state.nodes.retain(|n| n.id != *id),
        Operation::CreateRelation(edge) => {
            match state.edges.iter_mut().find(|e| e.id == edge.id) {
                Some(existing) => *existing = *edge,
                None => state.edges.push(*edge),
            }
        }
        Operation::DeleteRelation { id } => state.edges.retain(|e| e.id != *id),
        Operation::CreateMaterial(material) => {
            match state.materials.iter_mut().find(|m| m.id == material.id) {
                Some(existing) => existing.merge_from(material.clone()),
                None => state.materials.push(material.clone()),
            }
        }
        Operation::DeleteMaterial { id } => state.materials.retain(|m| m.id != *id),
        Operation::Ignored { .. } => {}
    }
}
