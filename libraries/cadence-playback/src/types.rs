//! Core types for the playback session

use crate::clock::ClockTime;
use cadence_core::Track;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Playback state
///
/// Exactly one variant holds at any instant. Variants that have a current
/// track carry it, so "playing with no track" cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing loaded
    Idle,

    /// Renderer is preparing the track
    Loading(Arc<Track>),

    /// Audible; position is `now - started_at` on the session clock
    Playing {
        track: Arc<Track>,
        started_at: ClockTime,
    },

    /// Paused mid-track
    Paused { track: Arc<Track>, position_ms: u64 },

    /// Renderer stalled waiting for data
    Buffering(Arc<Track>),

    /// Queue ran out
    Ended,

    /// Renderer failed; a new `play` recovers
    Failed(String),
}

impl PlaybackState {
    /// Discriminant without payload
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Idle => StateKind::Idle,
            Self::Loading(_) => StateKind::Loading,
            Self::Playing { .. } => StateKind::Playing,
            Self::Paused { .. } => StateKind::Paused,
            Self::Buffering(_) => StateKind::Buffering,
            Self::Ended => StateKind::Ended,
            Self::Failed(_) => StateKind::Failed,
        }
    }

    /// Track carried by the state, if any
    pub fn track(&self) -> Option<&Arc<Track>> {
        match self {
            Self::Loading(track) | Self::Buffering(track) => Some(track),
            Self::Playing { track, .. } | Self::Paused { track, .. } => Some(track),
            Self::Idle | Self::Ended | Self::Failed(_) => None,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing { .. })
    }
}

/// Payload-free playback state, used in errors and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Buffering,
    Ended,
    Failed,
}

impl StateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Buffering => "buffering",
            Self::Ended => "ended",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command or notification that asks for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Play,
    Pause,
    Resume,
    Stop,
    Seek,
    SkipNext,
    SkipPrevious,
    Restore,
    RendererReady,
    RendererBuffering,
    RendererError,
    TrackCompleted,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Seek => "seek",
            Self::SkipNext => "skip-next",
            Self::SkipPrevious => "skip-previous",
            Self::Restore => "restore",
            Self::RendererReady => "renderer-ready",
            Self::RendererBuffering => "renderer-buffering",
            Self::RendererError => "renderer-error",
            Self::TrackCompleted => "track-completed",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Stop when queue ends
    #[default]
    Off,

    /// Loop entire queue
    All,

    /// Loop current track only
    One,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::All => "all",
            Self::One => "one",
        }
    }
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "all" => Ok(Self::All),
            "one" => Ok(Self::One),
            other => Err(format!("unknown repeat mode: {other}")),
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shuffle mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleMode {
    /// Linear queue order
    #[default]
    Off,

    /// Advance through a random permutation
    On,
}

impl ShuffleMode {
    pub fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl From<bool> for ShuffleMode {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

/// How a shuffle permutation is generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuffleStrategy {
    /// Uniform Fisher-Yates permutation
    #[default]
    Random,

    /// Random, but interleave artists so the same artist rarely plays twice in a row
    SpreadArtists,
}

/// What the sleep timer does when it expires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepAction {
    /// Pause playback
    #[default]
    Pause,

    /// Stop playback
    Stop,

    /// Stop playback and ask the host process to exit
    StopAndExit,
}

impl FromStr for SleepAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "stop" => Ok(Self::Stop),
            "exit" | "stop_and_exit" | "stop-and-exit" => Ok(Self::StopAndExit),
            other => Err(format!("unknown sleep action: {other}")),
        }
    }
}

/// What to start playing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayRequest {
    /// Play a single track: jump to it if queued, otherwise insert it after the current track
    Track(Track),

    /// Replace the queue and start at `index` (clamped)
    Queue { tracks: Vec<Track>, index: usize },

    /// Play the queue's current track, honouring a restored position
    Current,
}

/// Configuration for the playback session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Progress tick interval (default: 1000ms)
    pub tick_interval_ms: u64,

    /// Sleep timer tick interval (default: 1000ms)
    pub sleep_tick_interval_ms: u64,

    /// Playback time between periodic checkpoints (default: 10000ms)
    pub checkpoint_interval_ms: u64,

    /// Delay before re-requesting focus after a delayed answer (default: 500ms)
    pub focus_retry_delay_ms: u64,

    /// Skip-previous restarts the track when further in than this (default: 3000ms)
    pub restart_threshold_ms: u64,

    /// Command channel capacity (default: 32)
    pub command_buffer: usize,

    /// Event broadcast capacity (default: 64)
    pub event_buffer: usize,

    /// Persistence key of the session snapshot
    pub snapshot_key: String,

    /// Shuffle permutation generator (default: Random)
    pub shuffle_strategy: ShuffleStrategy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            sleep_tick_interval_ms: 1000,
            checkpoint_interval_ms: 10_000,
            focus_retry_delay_ms: 500,
            restart_threshold_ms: 3000,
            command_buffer: 32,
            event_buffer: 64,
            snapshot_key: "playback.session".to_string(),
            shuffle_strategy: ShuffleStrategy::Random,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::TrackId;

    #[test]
    fn default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.sleep_tick_interval_ms, 1000);
        assert_eq!(config.restart_threshold_ms, 3000);
        assert_eq!(config.snapshot_key, "playback.session");
        assert_eq!(config.shuffle_strategy, ShuffleStrategy::Random);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"tick_interval_ms": 250}"#).unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.checkpoint_interval_ms, 10_000);
    }

    #[test]
    fn state_kind_and_track() {
        let track = Arc::new(Track::new(TrackId::new("a"), "A", 1000));
        let state = PlaybackState::Paused {
            track: track.clone(),
            position_ms: 10,
        };
        assert_eq!(state.kind(), StateKind::Paused);
        assert_eq!(state.track(), Some(&track));
        assert_eq!(PlaybackState::Ended.track(), None);
        assert_eq!(PlaybackState::Failed("x".into()).kind().to_string(), "failed");
    }

    #[test]
    fn modes_parse_from_strings() {
        assert_eq!("ALL".parse::<RepeatMode>().unwrap(), RepeatMode::All);
        assert!("sometimes".parse::<RepeatMode>().is_err());
        assert_eq!("exit".parse::<SleepAction>().unwrap(), SleepAction::StopAndExit);
        assert_eq!(ShuffleMode::from(true), ShuffleMode::On);
    }
}
