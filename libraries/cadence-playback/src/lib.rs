//! Cadence - Playback Session
//!
//! The part of the player that owns "what is playing right now".
//!
//! This crate provides:
//! - Play queue with repeat (Off, All, One) and shuffle (Random, artist-spread)
//! - Playback state machine (idle, loading, playing, paused, buffering, ended, failed)
//! - Clock-derived progress tracking with completion detection
//! - Sleep timer with cancel/replace semantics
//! - Audio focus arbitration (acquire, duck, loss, regain)
//! - Session snapshots persisted through any key/value store
//!
//! # Architecture
//!
//! [`PlaybackController`] is a synchronous state machine: every operation
//! receives the current session time and returns effects for the outside
//! world. [`SessionHandle::spawn`] wraps it in a tokio task that serializes
//! all commands and callbacks, runs the tickers and talks to the
//! collaborators from `cadence-core` (renderer, focus host, storage, library).
//!
//! # Example: Driving the controller
//!
//! ```rust
//! use cadence_core::{Track, TrackId};
//! use cadence_playback::{PlayRequest, PlaybackController, StateKind};
//!
//! let mut controller = PlaybackController::default();
//! let track = Track::new(TrackId::new("a"), "Intro", 180_000);
//!
//! controller.play(PlayRequest::Track(track), 0).unwrap();
//! assert_eq!(controller.state().kind(), StateKind::Loading);
//!
//! // The runtime reports the renderer's load result
//! let generation = controller.generation();
//! controller.load_finished(generation, Ok(()), 10);
//! assert_eq!(controller.state().kind(), StateKind::Playing);
//!
//! // Pausing while idle is rejected
//! controller.stop(20).unwrap();
//! assert!(controller.pause(30).unwrap_err().is_illegal_transition());
//! ```

pub mod clock;
pub mod controller;
pub mod error;
pub mod events;
pub mod focus;
pub mod progress;
pub mod queue;
pub mod runtime;
pub mod session_store;
pub mod shuffle;
pub mod sleep_timer;
pub mod types;

pub use clock::{ClockTime, SessionClock};
pub use controller::{Effect, PlaybackController};
pub use error::{PlaybackError, Result};
pub use events::{PlaybackEvent, SessionView};
pub use focus::{FocusArbiter, FocusGrant};
pub use progress::ProgressTracker;
pub use queue::{Queue, QueueSnapshot, Removal};
pub use runtime::{Collaborators, SessionHandle};
pub use session_store::{RestoredSession, SessionSnapshot, SessionStore, SNAPSHOT_SCHEMA_VERSION};
pub use sleep_timer::{SleepCountdown, SleepTimer};
pub use types::{
    CommandKind, PlayRequest, PlaybackState, RepeatMode, SessionConfig, ShuffleMode,
    ShuffleStrategy, SleepAction, StateKind,
};
