//! Collaborator traits for the playback session
//!
//! The session never talks to a platform directly. Audio output, the host's
//! focus manager, persistence and the media library are all reached through
//! the traits below; their asynchronous notifications flow back into the
//! session as plain values (`RendererEvent`, `FocusChange`).

use crate::error::Result;
use crate::types::{Track, TrackId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Platform media engine that turns a track into sound
///
/// Implementers own decoding and output. `load` resolves once the track is
/// ready to start (or failed); everything after that is reported through
/// [`RendererEvent`]s delivered to the session handle.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Prepare a track for playback
    ///
    /// # Errors
    /// Returns an error if the track cannot be opened or decoded
    async fn load(&self, track: &Track) -> Result<()>;

    /// Start (or resume) output of the loaded track
    async fn start(&self) -> Result<()>;

    /// Pause output, keeping the loaded track
    async fn pause(&self) -> Result<()>;

    /// Stop output and unload the track
    async fn stop(&self) -> Result<()>;

    /// Seek within the loaded track
    async fn seek(&self, position: Duration) -> Result<()>;

    /// Lower (or restore) the output level for a transient focus duck
    fn set_ducked(&self, ducked: bool) {
        let _ = ducked;
    }
}

/// Asynchronous notification from the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererEvent {
    /// Output stalled waiting for data
    Buffering,

    /// Output can continue (after buffering)
    Ready,

    /// Playback failed
    Error(String),

    /// The loaded track reached its end
    Completed,
}

/// Host answer to a focus request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusResponse {
    /// Exclusive playback permission granted
    Granted,

    /// Permission refused
    Denied,

    /// Host asks the caller to retry later
    Delayed,
}

/// Asynchronous focus notification from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusChange {
    /// Another client took focus
    Lost,

    /// Another client needs a transient lower output level
    Duck,

    /// Focus came back after a loss or duck
    Regained,
}

/// Host environment that mediates exclusive audio output
#[async_trait]
pub trait FocusHost: Send + Sync {
    /// Request exclusive playback permission
    async fn request(&self) -> Result<FocusResponse>;

    /// Give up playback permission
    async fn abandon(&self) -> Result<()>;
}

/// Minimal key/value persistence contract
///
/// Any storage engine can implement this; the session only ever writes a
/// single slot.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Overwrite the value stored under `key`
    async fn write(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Read the value stored under `key`, `None` if absent
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Media library lookup used when restoring a session
#[async_trait]
pub trait TrackLibrary: Send + Sync {
    /// Resolve a track by ID, `None` if it no longer exists
    async fn resolve(&self, id: &TrackId) -> Result<Option<Track>>;

    /// Resolve many tracks, preserving order
    async fn resolve_all(&self, ids: &[TrackId]) -> Result<Vec<Option<Track>>> {
        let mut tracks = Vec::with_capacity(ids.len());
        for id in ids {
            tracks.push(self.resolve(id).await?);
        }
        Ok(tracks)
    }
}
