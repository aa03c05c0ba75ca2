//! # verdant-collab — live project sync for Verdant
//!
//! Keeps a local [`GraphState`](verdant_core::GraphState) in step with the
//! server: one REST snapshot, then a stream of pushed operations over a
//! self-healing WebSocket, with local undo/redo on top.
//!
//! ## Architecture
//!
//! ```text
//!  GET /projects/{id}/graph        ws /socket/projects/{id}
//!  ┌────────────────┐              ┌──────────────┐
//!  │ SnapshotLoader │              │ PatchChannel │ ◄── backoff reconnect
//!  └───────┬────────┘              └──────┬───────┘
//!          │ seed                         │ Edit::Remote
//!          ▼                              ▼
//!  ┌────────────────────────────────────────────────┐
//!  │ SyncCoordinator ── apply() ── HistoryManager   │ ◄── Edit::Local / Undo / Redo
//!  └──────────────────────┬─────────────────────────┘
//!                         │ watch
//!                         ▼
//!                    UI / renderer
//! ```
//!
//! ## Modules
//!
//! - [`config`] — endpoints, history depth and reconnect policy
//! - [`endpoint`] — REST and socket URLs for a project
//! - [`snapshot`] — one-shot full state fetch
//! - [`writer`] — REST writes backing local edits
//! - [`channel`] — push channel with bounded exponential backoff
//! - [`coordinator`] — the session state machine
//! - [`session`] — async driver tying the above to a tokio task

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod session;
pub mod snapshot;
pub mod writer;

/// Server-side project identifier.
pub type ProjectId = i64;

pub use channel::{ChannelEvent, ChannelState, PatchChannel};
pub use config::{ReconnectPolicy, SyncConfig};
pub use coordinator::{Edit, SessionStatus, SessionTicket, SyncCoordinator};
pub use endpoint::{project_from_link, Endpoints};
pub use error::{Result, SyncError};
pub use session::Session;
pub use snapshot::SnapshotLoader;
pub use writer::{MaterialDraft, NodeDraft, RelationDraft, WriteClient};
