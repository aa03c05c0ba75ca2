//! Error taxonomy for a sync session.
//!
//! Only [`SyncError::LoadFailed`] and [`SyncError::ChannelExhausted`] end the
//! session's normal operation; everything else is local to one message, one
//! reconnect attempt or one user action.

use thiserror::Error;
use verdant_core::OperationError;

use crate::ProjectId;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Snapshot fetch failed. Not retried here.
    #[error("failed to load project {project}: {reason}")]
    LoadFailed { project: ProjectId, reason: String },

    /// Transient channel failure; a reconnect is scheduled.
    #[error("channel error: {0}")]
    Channel(String),

    #[error("channel gave up after {attempts} failed attempts")]
    ChannelExhausted { attempts: u32 },

    /// Inbound message that is not an operation record. Dropped.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] OperationError),

    /// A REST write for a local edit failed. State is untouched.
    #[error("{action} failed: {reason}")]
    WriteFailed { action: String, reason: String },

    /// A local edit rejected before it was sent.
    #[error("invalid draft: {0}")]
    InvalidDraft(String),

    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("http client setup failed: {0}")]
    HttpClient(String),

    #[error("session is closed")]
    SessionClosed,
}

impl SyncError {
    pub(crate) fn write(action: &str, reason: impl ToString) -> Self {
        Self::WriteFailed {
            action: action.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_url(url: &str, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error puts the whole session into an error state.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::LoadFailed { .. } | Self::ChannelExhausted { .. })
    }
}
