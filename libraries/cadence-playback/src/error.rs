//! Error types for the playback session

use crate::types::{CommandKind, StateKind};
use cadence_core::CoreError;
use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Command is not valid in the current state; state is unchanged
    #[error("Illegal state transition: {command} while {state}")]
    IllegalStateTransition {
        /// State the controller was in
        state: StateKind,
        /// Command that was rejected
        command: CommandKind,
    },

    /// Empty or out-of-range queue operation, rejected before any mutation
    #[error("Invalid queue operation: {0}")]
    InvalidQueue(String),

    /// Renderer failed to load or play a track
    #[error("Renderer error: {0}")]
    Renderer(String),

    /// Host refused audio focus
    #[error("Audio focus denied")]
    FocusDenied,

    /// Persistence backend failed (advisory only)
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Session runtime is no longer running
    #[error("Playback session closed")]
    SessionClosed,
}

impl PlaybackError {
    pub(crate) fn illegal(state: StateKind, command: CommandKind) -> Self {
        Self::IllegalStateTransition { state, command }
    }

    pub(crate) fn invalid_queue(msg: impl Into<String>) -> Self {
        Self::InvalidQueue(msg.into())
    }

    /// Whether this error is a rejected transition
    pub fn is_illegal_transition(&self) -> bool {
        matches!(self, Self::IllegalStateTransition { .. })
    }
}

impl From<CoreError> for PlaybackError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Renderer(msg) => Self::Renderer(msg),
            CoreError::Focus(_) => Self::FocusDenied,
            other => Self::Persistence(other.to_string()),
        }
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
