//! Playback Events
//!
//! Observable output of a session. Two channels:
//! - [`PlaybackEvent`]: discrete notifications (state changes, track changes,
//!   position ticks, errors), broadcast to every subscriber
//! - [`SessionView`]: the latest full picture, published through a `watch`
//!   so late subscribers start from current state

use crate::queue::QueueSnapshot;
use crate::sleep_timer::SleepTimer;
use crate::types::{RepeatMode, ShuffleMode, StateKind};
use cadence_core::TrackId;
use serde::{Deserialize, Serialize};

/// Events emitted by the playback session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackEvent {
    /// Playback state changed
    StateChanged {
        /// State before the transition
        from: StateKind,
        /// The new playback state
        to: StateKind,
    },

    /// A different track became current
    TrackChanged {
        /// ID of the new (current) track
        track_id: TrackId,
        /// ID of the previous track (if any)
        previous_track_id: Option<TrackId>,
    },

    /// Track finished playing naturally (reached end)
    TrackFinished {
        /// ID of the finished track
        track_id: TrackId,
    },

    /// Position update (once per progress tick, and after seeks)
    PositionUpdate {
        /// Current playback position
        position_ms: u64,
        /// Total track duration
        duration_ms: u64,
    },

    /// Queue changed (tracks added/removed/replaced)
    QueueChanged {
        /// New queue length
        length: usize,
    },

    /// Repeat or shuffle mode changed
    ModesChanged {
        repeat: RepeatMode,
        shuffle: ShuffleMode,
    },

    /// Sleep timer armed, replaced, cancelled, or fired
    SleepTimerChanged { timer: SleepTimer },

    /// Output level lowered or restored for a focus duck
    DuckChanged { ducked: bool },

    /// Sleep timer asked the host to shut down
    ExitRequested,

    /// Error occurred during playback
    Error {
        /// Error message
        message: String,
    },
}

/// Latest observable state of a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub state: StateKind,
    pub track_id: Option<TrackId>,
    /// Position at the time the view was published
    pub position_ms: u64,
    pub queue: QueueSnapshot,
    pub repeat: RepeatMode,
    pub shuffle: ShuffleMode,
    pub sleep_timer: SleepTimer,
    pub ducked: bool,
    pub exit_requested: bool,
}
