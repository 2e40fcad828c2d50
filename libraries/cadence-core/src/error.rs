/// Core error types for Cadence
use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error reported by a collaborator (renderer, focus host, storage, library)
#[derive(Error, Debug)]
pub enum CoreError {
    /// Audio renderer failed to load or play a track
    #[error("Renderer error: {0}")]
    Renderer(String),

    /// Host focus manager failed
    #[error("Focus error: {0}")]
    Focus(String),

    /// Storage backend failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a renderer error
    pub fn renderer(msg: impl Into<String>) -> Self {
        Self::Renderer(msg.into())
    }

    /// Create a focus error
    pub fn focus(msg: impl Into<String>) -> Self {
        Self::Focus(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}
