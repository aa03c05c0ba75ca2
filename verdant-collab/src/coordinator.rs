//! The session state machine.
//!
//! [`SyncCoordinator`] owns the canonical [`GraphState`] for one project. It
//! does no I/O: the [`Session`](crate::Session) driver feeds it snapshot
//! results, channel events and local edits, one at a time, and publishes
//! whatever it reports as changed.
//!
//! History rules:
//! - [`Edit::Local`] creates a checkpoint.
//! - [`Edit::Remote`] is replayed over every checkpoint instead, so undo and
//!   redo never revert or resurrect another client's change.
//! - [`Edit::Undo`] and [`Edit::Redo`] move through local checkpoints only.
//!
//! The server broadcasts every write to all clients, the author included.
//! An echo of a local write is recognised in either arrival order and never
//! turns into a remote change.

use std::collections::VecDeque;

use verdant_core::op::{
    CREATE_MATERIAL, CREATE_NODE, CREATE_RELATION, DELETE_MATERIAL, DELETE_NODE, DELETE_RELATION,
};
use verdant_core::{apply, apply_mut, GraphState, HistoryManager, Id, Operation};

use crate::channel::{ChannelEvent, ChannelState};
use crate::error::SyncError;
use crate::ProjectId;

/// Every transition the coordinator accepts after seeding.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Confirmed by a REST write from this client.
    Local(Operation),
    /// Pushed by the server.
    Remote(Operation),
    Undo,
    Redo,
}

/// Whole-session condition shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Loading,
    Live,
    /// The channel gave up. Local state is still usable but no longer
    /// receives remote changes.
    Stale { attempts: u32 },
    /// The snapshot could not be loaded.
    Failed(String),
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stale { .. } | Self::Failed(_))
    }
}

/// Identifies one `begin` call. Results carrying an older ticket are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket {
    pub project: ProjectId,
    pub generation: u64,
}

pub struct SyncCoordinator {
    project: Option<ProjectId>,
    generation: u64,
    seeded: bool,
    history: HistoryManager<GraphState>,
    echoes: EchoLedger,
    status: SessionStatus,
    channel: ChannelState,
}

impl SyncCoordinator {
    pub fn new(history_limit: usize) -> Self {
        Self {
            project: None,
            generation: 0,
            seeded: false,
            history: HistoryManager::new(GraphState::new(), history_limit),
            echoes: EchoLedger::default(),
            status: SessionStatus::Idle,
            channel: ChannelState::Disconnected,
        }
    }

    /// Start a session for `project`, discarding all previous state.
    pub fn begin(&mut self, project: ProjectId) -> SessionTicket {
        self.generation += 1;
        self.project = Some(project);
        self.seeded = false;
        self.history.reset(GraphState::new());
        self.echoes.clear();
        self.status = SessionStatus::Loading;
        self.channel = ChannelState::Disconnected;
        log::debug!("session {} for project {project} begins", self.generation);
        SessionTicket {
            project,
            generation: self.generation,
        }
    }

    /// Seed `present` with a decorated snapshot. Returns `false` when the
    /// ticket is stale.
    pub fn seed(&mut self, ticket: SessionTicket, snapshot: GraphState) -> bool {
        if !self.is_current(ticket) {
            log::debug!("discarding snapshot for stale session {}", ticket.generation);
            return false;
        }
        self.history.reset(snapshot);
        self.seeded = true;
        self.status = SessionStatus::Live;
        true
    }

    pub fn fail_load(&mut self, ticket: SessionTicket, error: &SyncError) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        log::error!("{error}");
        self.status = SessionStatus::Failed(error.to_string());
        true
    }

    /// Apply one transition. Returns whether `present` changed.
    ///
    /// Edits before the snapshot is seeded are dropped.
    pub fn commit(&mut self, edit: Edit) -> bool {
        if !self.seeded {
            log::debug!("dropping {edit:?}: no snapshot yet");
            return false;
        }
        match edit {
            Edit::Local(op) => self.commit_local(op),
            Edit::Remote(op) => self.commit_remote(op),
            Edit::Undo => self.history.undo(),
            Edit::Redo => self.history.redo(),
        }
    }

    fn commit_local(&mut self, op: Operation) -> bool {
        let Some(key) = EchoKey::of(&op) else {
            return false;
        };
        if key.is_create() && self.echoes.is_deleted(key.counterpart()) {
            log::debug!("`{}` {} was deleted remotely before its write confirmed", key.tag, key.id);
            return false;
        }
        if self.echoes.claim(key) {
            // The echo arrived first and was rebased into every frame. Take it
            // back out so this write becomes an ordinary checkpoint.
            let op = pin_position(op, self.history.present());
            let removal = key.removal();
            self.history.rebase(|frame| apply_mut(frame, &removal));
            let next = apply(self.history.present(), &op);
            return self.history.record(next);
        }
        if let Some(restore) = self.echoes.claim_removal(key) {
            // Same for a delete whose echo came first: put the entity back in
            // `present` and checkpoint the delete from there.
            let restored = apply(self.history.present(), &restore);
            self.history.replace_present(restored);
            let next = apply(self.history.present(), &op);
            return self.history.record(next);
        }
        let next = apply(self.history.present(), &op);
        let changed = self.history.record(next);
        if changed {
            self.echoes.expect(key);
        }
        changed
    }

    fn commit_remote(&mut self, op: Operation) -> bool {
        if op.is_ignored() {
            log::debug!("ignoring remote `{}`", op.tag());
            return false;
        }
        let key = EchoKey::of(&op);
        if let Some(key) = key {
            if self.echoes.consume(key) {
                log::debug!("echo of local `{}` {}", key.tag, key.id);
                return false;
            }
        }

        let before = self.history.present().clone();
        let placed = apply(&before, &op);
        let op = pin_position(op, &placed);
        self.history.rebase(|frame| apply_mut(frame, &op));
        match key {
            Some(key) if key.is_create() => self.echoes.unclaimed(key),
            Some(key) => self.echoes.deleted(key, key.restoration(&before)),
            None => {}
        }
        *self.history.present() != before
    }

    /// Track the channel and turn pushed operations into remote edits.
    /// Returns whether `present` changed.
    pub fn on_channel_event(&mut self, event: ChannelEvent) -> bool {
        match event {
            ChannelEvent::Opened => {
                self.channel = ChannelState::Open;
                false
            }
            ChannelEvent::Operation(op) => self.commit(Edit::Remote(op)),
            ChannelEvent::Lost { .. } | ChannelEvent::Reconnecting { .. } => {
                self.channel = ChannelState::Disconnected;
                false
            }
            ChannelEvent::Exhausted { attempts } => {
                self.channel = ChannelState::Failed;
                if self.status == SessionStatus::Live {
                    self.status = SessionStatus::Stale { attempts };
                }
                false
            }
            ChannelEvent::Closed => {
                self.channel = ChannelState::Disconnected;
                false
            }
        }
    }

    /// End the session and discard all state.
    pub fn end(&mut self) {
        self.generation += 1;
        self.project = None;
        self.seeded = false;
        self.history.reset(GraphState::new());
        self.echoes.clear();
        self.status = SessionStatus::Idle;
        self.channel = ChannelState::Disconnected;
    }

    pub fn state(&self) -> &GraphState {
        self.history.present()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel
    }

    pub fn project(&self) -> Option<ProjectId> {
        self.project
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn is_current(&self, ticket: SessionTicket) -> bool {
        ticket.generation == self.generation && self.project == Some(ticket.project)
    }
}

/// Recently seen writes, kept per session to tell echoes apart.
const ECHO_WINDOW: usize = 64;

/// Operation tag plus the id it acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EchoKey {
    tag: &'static str,
    id: Id,
}

impl EchoKey {
    fn of(op: &Operation) -> Option<Self> {
        let (tag, id) = match op {
            Operation::CreateNode(node) => (CREATE_NODE, node.id),
            Operation::DeleteNode { id } => (DELETE_NODE, *id),
            Operation::CreateRelation(edge) => (CREATE_RELATION, edge.id),
            Operation::DeleteRelation { id } => (DELETE_RELATION, *id),
            Operation::CreateMaterial(material) => (CREATE_MATERIAL, material.id),
            Operation::DeleteMaterial { id } => (DELETE_MATERIAL, *id),
            Operation::Ignored { .. } => return None,
        };
        Some(Self { tag, id })
    }

    fn is_create(&self) -> bool {
        matches!(self.tag, CREATE_NODE | CREATE_RELATION | CREATE_MATERIAL)
    }

    /// The delete that undoes a create with this key.
    fn removal(&self) -> Operation {
        let id = self.id;
        match self.tag {
            CREATE_NODE => Operation::DeleteNode { id },
            CREATE_RELATION => Operation::DeleteRelation { id },
            CREATE_MATERIAL => Operation::DeleteMaterial { id },
            tag => Operation::Ignored { op: tag.to_string() },
        }
    }

    /// The create that puts back what a delete with this key removes from
    /// `state`.
    fn restoration(&self, state: &GraphState) -> Option<Operation> {
        match self.tag {
            DELETE_NODE => state.node(self.id).cloned().map(Operation::CreateNode),
            DELETE_RELATION => state.edge(self.id).copied().map(Operation::CreateRelation),
            DELETE_MATERIAL => state.material(self.id).cloned().map(Operation::CreateMaterial),
            _ => None,
        }
    }

    /// The create for a delete, and the other way round.
    fn counterpart(&self) -> Self {
        let tag = match self.tag {
            CREATE_NODE => DELETE_NODE,
            DELETE_NODE => CREATE_NODE,
            CREATE_RELATION => DELETE_RELATION,
            DELETE_RELATION => CREATE_RELATION,
            CREATE_MATERIAL => DELETE_MATERIAL,
            DELETE_MATERIAL => CREATE_MATERIAL,
            tag => tag,
        };
        Self { tag, id: self.id }
    }
}

/// Local writes waiting for their echo, remote creates that may turn out to
/// be echoes of a write whose response is still in flight, and remote
/// deletes. Server ids are never reused, so a deleted id stays deleted.
#[derive(Debug, Default)]
struct EchoLedger {
    expected: VecDeque<EchoKey>,
    unclaimed: VecDeque<EchoKey>,
    deleted: VecDeque<Tombstone>,
}

/// A remote delete and the create that would undo it, until a local delete
/// claims it.
#[derive(Debug)]
struct Tombstone {
    key: EchoKey,
    restore: Option<Operation>,
}

impl EchoLedger {
    fn expect(&mut self, key: EchoKey) {
        push_bounded(&mut self.expected, key);
    }

    fn consume(&mut self, key: EchoKey) -> bool {
        take(&mut self.expected, key)
    }

    fn unclaimed(&mut self, key: EchoKey) {
        push_bounded(&mut self.unclaimed, key);
    }

    fn claim(&mut self, key: EchoKey) -> bool {
        take(&mut self.unclaimed, key)
    }

    fn deleted(&mut self, key: EchoKey, restore: Option<Operation>) {
        take(&mut self.unclaimed, key.counterpart());
        push_bounded(&mut self.deleted, Tombstone { key, restore });
    }

    fn is_deleted(&self, key: EchoKey) -> bool {
        self.deleted.iter().any(|t| t.key == key)
    }

    /// Hand out the restoring create once. The tombstone itself stays.
    fn claim_removal(&mut self, key: EchoKey) -> Option<Operation> {
        self.deleted
            .iter_mut()
            .find(|t| t.key == key)
            .and_then(|t| t.restore.take())
    }

    fn clear(&mut self) {
        self.expected.clear();
        self.unclaimed.clear();
        self.deleted.clear();
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, entry: T) {
    if queue.len() == ECHO_WINDOW {
        queue.pop_front();
    }
    queue.push_back(entry);
}

fn take(queue: &mut VecDeque<EchoKey>, key: EchoKey) -> bool {
    match queue.iter().position(|k| *k == key) {
        Some(index) => {
            queue.remove(index);
            true
        }
        None => false,
    }
}

/// Give a remote node the position it got in `present`, so it sits at the
/// same place in every history frame.
fn pin_position(op: Operation, present: &GraphState) -> Operation {
    match op {
        Operation::CreateNode(mut node) if node.position.is_none() => {
            node.position = present.node(node.id).and_then(|n| n.position);
            Operation::CreateNode(node)
        }
        op => op,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use verdant_core::{Component, Material, Operation};

    fn seeded(snapshot: GraphState) -> SyncCoordinator {
        let mut c = SyncCoordinator::new(10);
        let ticket = c.begin(1);
        assert!(c.seed(ticket, snapshot));
        c
    }

    fn steel() -> Material {
        Material {
            id: 9,
            name: Some("Steel".into()),
            weight: Some(5.0),
            co2_value: None,
            hardness: None,
        }
    }

    #[test]
    fn test_child_lands_apart_from_root() {
        let mut snapshot = GraphState::new();
        snapshot.nodes.push(Component::new(1).with_level(0));
        crate::snapshot::decorate(&mut snapshot);
        let mut c = seeded(snapshot);

        let op = Operation::from_json(
            r#"{"op":"create_node","node":{"id":2,"level":1,"parent_id":1}}"#,
        )
        .unwrap();
        assert!(c.on_channel_event(ChannelEvent::Operation(op)));

        let state = c.state();
        assert_eq!(state.nodes.len(), 2);
        assert_ne!(state.node(1).unwrap().position, state.node(2).unwrap().position);
    }

    #[test]
    fn test_remote_delete_survives_undo() {
        let mut c = seeded(GraphState::new());
        assert!(c.commit(Edit::Local(Operation::CreateMaterial(steel()))));
        assert!(c.can_undo());

        assert!(c.commit(Edit::Remote(Operation::DeleteMaterial { id: 9 })));
        assert!(c.state().material(9).is_none());

        c.commit(Edit::Undo);
        assert!(c.state().material(9).is_none());
        c.commit(Edit::Redo);
        assert!(c.state().material(9).is_none());
    }

    #[test]
    fn test_undo_keeps_remote_additions() {
        let mut c = seeded(GraphState::new());
        c.commit(Edit::Local(Operation::CreateNode(Component::new(1))));
        c.commit(Edit::Remote(Operation::CreateNode(Component::new(2))));

        assert!(c.commit(Edit::Undo));
        assert!(c.state().node(1).is_none());
        assert!(c.state().node(2).is_some());
        assert!(c.commit(Edit::Redo));
        assert!(c.state().node(1).is_some());
    }

    #[test]
    fn test_remote_node_keeps_position_across_undo() {
        let mut c = seeded(GraphState::new());
        c.commit(Edit::Local(Operation::CreateNode(Component::new(1))));
        c.commit(Edit::Remote(Operation::CreateNode(Component::new(2))));
        let placed = c.state().node(2).unwrap().position;

        c.commit(Edit::Undo);
        assert_eq!(c.state().node(2).unwrap().position, placed);
    }

    #[test]
    fn test_remote_delete_of_undone_node_blocks_redo() {
        let mut c = seeded(GraphState::new());
        c.commit(Edit::Local(Operation::CreateNode(Component::new(1))));
        c.commit(Edit::Undo);
        assert!(c.can_redo());

        assert!(!c.commit(Edit::Remote(Operation::DeleteNode { id: 1 })));
        assert!(!c.can_redo());
        assert!(c.state().node(1).is_none());
    }

    #[test]
    fn test_echo_after_write_response_is_consumed() {
        let mut c = seeded(GraphState::new());
        let mut panel = Component::new(4).with_level(0);
        panel.name = Some("Panel".into());
        assert!(c.commit(Edit::Local(Operation::CreateNode(panel))));

        let echo = Operation::from_json(r#"{"op":"create_node","id":4}"#).unwrap();
        assert!(!c.on_channel_event(ChannelEvent::Operation(echo)));
        assert!(c.can_undo());

        assert!(c.commit(Edit::Undo));
        assert!(c.state().node(4).is_none());
    }

    #[test]
    fn test_echo_before_write_response_is_claimed() {
        let mut c = seeded(GraphState::new());
        let echo = Operation::from_json(r#"{"op":"create_material","id":9}"#).unwrap();
        assert!(c.on_channel_event(ChannelEvent::Operation(echo)));
        assert!(!c.can_undo());

        assert!(c.commit(Edit::Local(Operation::CreateMaterial(steel()))));
        assert_eq!(c.state().material(9), Some(&steel()));

        assert!(c.commit(Edit::Undo));
        assert!(c.state().material(9).is_none());
    }

    #[test]
    fn test_write_confirmed_after_remote_delete_stays_deleted() {
        let mut c = seeded(GraphState::new());
        let echo = Operation::from_json(r#"{"op":"create_material","id":9}"#).unwrap();
        c.on_channel_event(ChannelEvent::Operation(echo));
        c.commit(Edit::Remote(Operation::DeleteMaterial { id: 9 }));

        assert!(!c.commit(Edit::Local(Operation::CreateMaterial(steel()))));
        assert!(c.state().material(9).is_none());
        assert!(!c.can_undo());
    }

    #[test]
    fn test_local_delete_is_a_checkpoint_in_either_echo_order() {
        let mut snapshot = GraphState::new();
        let mut frame = Component::new(1).with_level(0);
        frame.name = Some("Frame".into());
        snapshot.nodes.push(frame);
        crate::snapshot::decorate(&mut snapshot);

        for echo_first in [false, true] {
            let mut c = seeded(snapshot.clone());
            let delete = Operation::DeleteNode { id: 1 };

            if echo_first {
                assert!(c.commit(Edit::Remote(delete.clone())));
                assert!(!c.can_undo());
            }
            assert!(c.commit(Edit::Local(delete.clone())), "echo first: {echo_first}");
            if !echo_first {
                assert!(!c.commit(Edit::Remote(delete.clone())));
            }

            assert!(c.state().node(1).is_none());
            assert!(c.can_undo(), "echo first: {echo_first}");
            assert!(c.commit(Edit::Undo));
            assert_eq!(c.state(), &snapshot, "echo first: {echo_first}");
            assert!(c.commit(Edit::Redo));
            assert!(c.state().node(1).is_none());
        }
    }

    #[test]
    fn test_local_material_delete_after_echo_restores_it_on_undo() {
        let mut snapshot = GraphState::new();
        snapshot.materials.push(steel());
        let mut c = seeded(snapshot);

        c.commit(Edit::Remote(Operation::DeleteMaterial { id: 9 }));
        assert!(c.commit(Edit::Local(Operation::DeleteMaterial { id: 9 })));
        // A repeated confirmation has nothing left to claim.
        assert!(!c.commit(Edit::Local(Operation::DeleteMaterial { id: 9 })));

        assert!(c.commit(Edit::Undo));
        assert_eq!(c.state().material(9), Some(&steel()));
        assert!(!c.commit(Edit::Undo));
    }

    #[test]
    fn test_remote_delete_of_absent_entity_leaves_nothing_to_claim() {
        let mut c = seeded(GraphState::new());
        assert!(!c.commit(Edit::Remote(Operation::DeleteNode { id: 5 })));
        assert!(!c.commit(Edit::Local(Operation::DeleteNode { id: 5 })));
        assert!(!c.can_undo());
    }

    #[test]
    fn test_claimed_node_keeps_its_position() {
        let mut c = seeded(GraphState::new());
        c.commit(Edit::Remote(Operation::CreateNode(Component::new(1))));
        c.commit(Edit::Remote(Operation::CreateNode(Component::new(2))));
        let placed = c.state().node(1).unwrap().position;

        let mut full = Component::new(1).with_level(0);
        full.name = Some("Frame".into());
        assert!(c.commit(Edit::Local(Operation::CreateNode(full))));
        assert_eq!(c.state().node(1).unwrap().position, placed);
        assert_eq!(c.state().node(1).unwrap().name.as_deref(), Some("Frame"));
    }

    #[test]
    fn test_remote_edits_are_not_checkpoints() {
        let mut c = seeded(GraphState::new());
        c.commit(Edit::Remote(Operation::CreateNode(Component::new(3))));
        assert!(!c.can_undo());
        assert!(!c.commit(Edit::Undo));
        assert!(c.state().node(3).is_some());
    }

    #[test]
    fn test_ignored_remote_op_changes_nothing() {
        let mut c = seeded(GraphState::new());
        let op = Operation::Ignored { op: "create_project".into() };
        assert!(!c.on_channel_event(ChannelEvent::Operation(op)));
        assert!(c.state().is_empty());
    }

    #[test]
    fn test_edits_before_seed_are_dropped() {
        let mut c = SyncCoordinator::new(10);
        c.begin(4);
        assert!(!c.commit(Edit::Local(Operation::CreateNode(Component::new(1)))));
        assert!(c.state().is_empty());
        assert_eq!(*c.status(), SessionStatus::Loading);
    }

    #[test]
    fn test_stale_ticket_ignored() {
        let mut c = SyncCoordinator::new(10);
        let old = c.begin(1);
        let current = c.begin(2);

        let mut snapshot = GraphState::new();
        snapshot.nodes.push(Component::new(7));
        assert!(!c.seed(old, snapshot.clone()));
        assert!(c.state().is_empty());
        assert!(!c.fail_load(old, &SyncError::Channel("x".into())));
        assert_eq!(*c.status(), SessionStatus::Loading);

        assert!(c.seed(current, snapshot));
        assert_eq!(c.project(), Some(2));
        assert_eq!(*c.status(), SessionStatus::Live);
    }

    #[test]
    fn test_snapshot_after_end_is_discarded() {
        let mut c = SyncCoordinator::new(10);
        let ticket = c.begin(1);
        c.end();
        assert!(!c.seed(ticket, GraphState::new()));
        assert_eq!(*c.status(), SessionStatus::Idle);
    }

    #[test]
    fn test_load_failure_status() {
        let mut c = SyncCoordinator::new(10);
        let ticket = c.begin(3);
        let err = SyncError::LoadFailed {
            project: 3,
            reason: "server returned 500 Internal Server Error".into(),
        };
        assert!(c.fail_load(ticket, &err));
        assert!(matches!(c.status(), SessionStatus::Failed(reason) if reason.contains("500")));
        assert!(c.status().is_terminal());
    }

    #[test]
    fn test_channel_lifecycle_and_exhaustion() {
        let mut c = seeded(GraphState::new());
        c.on_channel_event(ChannelEvent::Opened);
        assert_eq!(c.channel_state(), ChannelState::Open);

        c.on_channel_event(ChannelEvent::Lost { reason: "reset".into() });
        c.on_channel_event(ChannelEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(10),
        });
        assert_eq!(c.channel_state(), ChannelState::Disconnected);
        assert_eq!(*c.status(), SessionStatus::Live);

        c.on_channel_event(ChannelEvent::Exhausted { attempts: 3 });
        assert_eq!(c.channel_state(), ChannelState::Failed);
        assert_eq!(*c.status(), SessionStatus::Stale { attempts: 3 });

        // Still usable locally.
        assert!(c.commit(Edit::Local(Operation::CreateNode(Component::new(1)))));
    }

    #[test]
    fn test_end_discards_state() {
        let mut c = seeded(GraphState::new());
        c.commit(Edit::Local(Operation::CreateNode(Component::new(1))));
        c.end();
        assert!(c.state().is_empty());
        assert!(!c.can_undo());
        assert_eq!(c.project(), None);
    }
}
