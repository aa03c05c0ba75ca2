//! Async driver for one project session.
//!
//! [`Session::start`] spawns a task that owns the [`SyncCoordinator`] and the
//! [`PatchChannel`]. Everything that touches state goes through that task,
//! so snapshot seeding, pushed operations, confirmed writes and undo/redo are
//! applied one after another and never interleave.
//!
//! ```text
//!            ┌──────── commands (mpsc) ────────┐
//!  Session ──┤                                 ▼
//!   handle   └── REST writes ──► confirmed ──► driver task ──► watch<GraphState>
//!                                                ▲         └─► watch<SessionStatus>
//!                               channel events ──┘
//! ```

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use verdant_core::{Component, Edge, GraphState, Id, Material, Operation};

use crate::channel::{ChannelEvent, PatchChannel};
use crate::config::SyncConfig;
use crate::coordinator::{Edit, SessionStatus, SyncCoordinator};
use crate::endpoint::Endpoints;
use crate::error::{Result, SyncError};
use crate::snapshot::SnapshotLoader;
use crate::writer::{MaterialDraft, NodeDraft, RelationDraft, WriteClient};
use crate::ProjectId;

enum Command {
    Local(Operation),
    Undo(oneshot::Sender<bool>),
    Redo(oneshot::Sender<bool>),
}

/// Handle to a running session. Dropping it cancels the session.
pub struct Session {
    id: Uuid,
    project: ProjectId,
    writer: WriteClient,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<GraphState>,
    status: watch::Receiver<SessionStatus>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Session {
    /// Load `project` and go live. Must be called inside a tokio runtime.
    ///
    /// Returns once the driver is spawned; watch [`Session::status`] for the
    /// outcome of the snapshot load.
    pub fn start(config: SyncConfig, project: ProjectId) -> Result<Self> {
        let endpoints = Endpoints::new(&config.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::HttpClient(e.to_string()))?;

        let id = Uuid::new_v4();
        let channel = PatchChannel::new(
            endpoints.socket(project),
            config.reconnect.clone(),
            config.event_buffer,
        );
        let (commands_tx, commands_rx) = mpsc::channel(config.event_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(GraphState::new());
        let (status_tx, status_rx) = watch::channel(SessionStatus::Idle);
        let cancel = CancellationToken::new();

        let driver = Driver {
            id,
            project,
            coordinator: SyncCoordinator::new(config.history_limit),
            loader: SnapshotLoader::new(http.clone(), endpoints.clone()),
            channel,
            state_tx,
            status_tx,
        };
        log::info!("session {id} starting for project {project}");
        let task = tokio::spawn(driver.run(commands_rx, cancel.clone()));

        Ok(Self {
            id,
            project,
            writer: WriteClient::new(http, endpoints),
            commands: commands_tx,
            state: state_rx,
            status: status_rx,
            cancel,
            task: Some(task),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn project(&self) -> ProjectId {
        self.project
    }

    /// Current graph, updated after every change.
    pub fn state(&self) -> watch::Receiver<GraphState> {
        self.state.clone()
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// A copy of the current graph.
    pub fn snapshot(&self) -> GraphState {
        self.state.borrow().clone()
    }

    pub async fn create_node(&self, draft: NodeDraft) -> Result<Component> {
        self.ensure_running()?;
        let node = self.writer.create_node(self.project, &draft).await?;
        self.submit(Operation::CreateNode(node.clone())).await?;
        Ok(node)
    }

    pub async fn create_material(&self, draft: MaterialDraft) -> Result<Material> {
        self.ensure_running()?;
        let material = self.writer.create_material(&draft).await?;
        self.submit(Operation::CreateMaterial(material.clone())).await?;
        Ok(material)
    }

    pub async fn create_relation(&self, draft: RelationDraft) -> Result<Edge> {
        self.ensure_running()?;
        let edge = self.writer.create_relation(self.project, draft).await?;
        self.submit(Operation::CreateRelation(edge)).await?;
        Ok(edge)
    }

    pub async fn delete_node(&self, id: Id) -> Result<()> {
        self.ensure_running()?;
        self.writer.delete_node(id).await?;
        self.submit(Operation::DeleteNode { id }).await
    }

    pub async fn delete_material(&self, id: Id) -> Result<()> {
        self.ensure_running()?;
        self.writer.delete_material(id).await?;
        self.submit(Operation::DeleteMaterial { id }).await
    }

    pub async fn delete_relation(&self, id: Id) -> Result<()> {
        self.ensure_running()?;
        self.writer.delete_relation(id).await?;
        self.submit(Operation::DeleteRelation { id }).await
    }

    /// Step back one local checkpoint. Returns `false` when there is none.
    pub async fn undo(&self) -> Result<bool> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::Undo(reply)).await?;
        answer.await.map_err(|_| SyncError::SessionClosed)
    }

    pub async fn redo(&self) -> Result<bool> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::Redo(reply)).await?;
        answer.await.map_err(|_| SyncError::SessionClosed)
    }

    /// Close the channel cleanly, discard state and wait for the driver.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("session {} driver ended abnormally: {e}", self.id);
            }
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.commands.is_closed() {
            return Err(SyncError::SessionClosed);
        }
        Ok(())
    }

    async fn submit(&self, op: Operation) -> Result<()> {
        self.send(Command::Local(op)).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::SessionClosed)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Driver {
    id: Uuid,
    project: ProjectId,
    coordinator: SyncCoordinator,
    loader: SnapshotLoader,
    channel: PatchChannel,
    state_tx: watch::Sender<GraphState>,
    status_tx: watch::Sender<SessionStatus>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken) {
        let ticket = self.coordinator.begin(self.project);
        self.publish_status();

        let loaded = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            loaded = self.loader.load(self.project) => Some(loaded),
        };
        match loaded {
            None => {
                self.finish().await;
                return;
            }
            Some(Ok(snapshot)) => {
                self.coordinator.seed(ticket, snapshot);
                self.publish_state();
                self.publish_status();
            }
            Some(Err(e)) => {
                self.coordinator.fail_load(ticket, &e);
                self.publish_status();
                log::info!("session {} stopped: snapshot unavailable", self.id);
                return;
            }
        }

        let Some(mut events) = self.channel.take_event_rx() else {
            return;
        };
        self.channel.open().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(event) = events.recv() => self.on_event(event),
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
            }
        }
        self.finish().await;
    }

    fn on_event(&mut self, event: ChannelEvent) {
        let exhausted = matches!(event, ChannelEvent::Exhausted { .. });
        if self.coordinator.on_channel_event(event) {
            self.publish_state();
        }
        if exhausted {
            self.publish_status();
        }
    }

    fn on_command(&mut self, command: Command) {
        let changed = match command {
            Command::Local(op) => self.coordinator.commit(Edit::Local(op)),
            Command::Undo(reply) => {
                let moved = self.coordinator.commit(Edit::Undo);
                let _ = reply.send(moved);
                moved
            }
            Command::Redo(reply) => {
                let moved = self.coordinator.commit(Edit::Redo);
                let _ = reply.send(moved);
                moved
            }
        };
        if changed {
            self.publish_state();
        }
    }

    async fn finish(&mut self) {
        self.channel.close().await;
        self.coordinator.end();
        self.publish_state();
        self.publish_status();
        log::info!("session {} closed", self.id);
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.coordinator.state().clone());
    }

    fn publish_status(&self) {
        let next = self.coordinator.status().clone();
        self.status_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}
