//! Playback controller state machine
//!
//! The controller is a plain synchronous value. Every operation takes `now`
//! on the session clock, validates the command against the current state and
//! records what has to happen outside as [`Effect`]s, plus observable
//! [`PlaybackEvent`]s. The session runtime drains both after every call.
//!
//! ```text
//!            play                ready
//!   Idle ──────────▶ Loading ─────────────▶ Playing ◀──── resume ──── Paused
//!    ▲                 │  ▲                  │  │ ▲                     ▲
//!    │ stop            │  │ completed/skip   │  │ │ ready               │
//!    │ (from any)      │  └──────────────────┘  │ │                     │
//!    │                 │ error                  │ └──── Buffering       │
//!    │                 ▼                        └──────────── pause ────┘
//!    └──────────── Failed                 queue exhausted ──▶ Ended
//! ```
//!
//! Commands that are not valid for the current state fail with
//! [`PlaybackError::IllegalStateTransition`] and change nothing.

use crate::clock::ClockTime;
use crate::error::{PlaybackError, Result};
use crate::events::{PlaybackEvent, SessionView};
use crate::focus::{FocusGrant, FocusLedger, GrantOutcome};
use crate::progress::{ProgressTracker, Tick};
use crate::queue::{Queue, Removal};
use crate::session_store::{RestoredSession, SessionSnapshot, SNAPSHOT_SCHEMA_VERSION};
use crate::sleep_timer::{SleepCountdown, SleepTick, SleepTimer};
use crate::types::{
    CommandKind, PlayRequest, PlaybackState, RepeatMode, SessionConfig, ShuffleMode,
    SleepAction, StateKind,
};
use cadence_core::{FocusChange, RendererEvent, Track, TrackId};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Side effect requested by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Load a track on the renderer; the result must carry `generation`
    Load { track: Arc<Track>, generation: u64 },

    /// Start (or resume) renderer output
    Start,

    /// Pause renderer output
    Pause,

    /// Stop renderer output
    Stop,

    /// Seek the renderer to a position in milliseconds
    Seek(u64),

    /// Lower or restore the output level
    Duck(bool),

    /// Request audio focus; the result must carry `epoch`
    AcquireFocus { epoch: u64 },

    /// Hand audio focus back to the host
    ReleaseFocus,

    /// (Re)start the progress ticker, cancelling any running one
    StartProgressTicker { epoch: u64 },

    StopProgressTicker,

    /// (Re)start the sleep ticker, cancelling any running one
    StartSleepTicker { epoch: u64 },

    StopSleepTicker,

    /// Persist a snapshot (fire-and-forget)
    Checkpoint(SessionSnapshot),
}

/// Playback session state machine
#[derive(Debug)]
pub struct PlaybackController {
    state: PlaybackState,
    queue: Queue,
    repeat: RepeatMode,
    shuffle: ShuffleMode,

    progress: ProgressTracker,
    sleep: SleepCountdown,
    focus: FocusLedger,

    /// Token of the most recent renderer load
    generation: u64,

    /// Position to continue from the next time playback starts: the start
    /// offset while loading, the frozen position while buffering, the stop
    /// position while idle
    resume_at_ms: u64,

    /// Focus was lost before playback started; pause instead of playing
    pause_pending: bool,

    exit_requested: bool,
    last_track_id: Option<TrackId>,
    restart_threshold_ms: u64,

    effects: Vec<Effect>,
    events: Vec<PlaybackEvent>,
}

impl PlaybackController {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            state: PlaybackState::Idle,
            queue: Queue::with_strategy(config.shuffle_strategy),
            repeat: RepeatMode::Off,
            shuffle: ShuffleMode::Off,
            progress: ProgressTracker::new(config.checkpoint_interval_ms),
            sleep: SleepCountdown::new(),
            focus: FocusLedger::new(),
            generation: 0,
            resume_at_ms: 0,
            pause_pending: false,
            exit_requested: false,
            last_track_id: None,
            restart_threshold_ms: config.restart_threshold_ms,
            effects: Vec::new(),
            events: Vec::new(),
        }
    }

    // ===== Queries =====

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    pub fn shuffle_mode(&self) -> ShuffleMode {
        self.shuffle
    }

    pub fn sleep_timer(&self) -> SleepTimer {
        self.sleep.timer()
    }

    pub fn is_ducked(&self) -> bool {
        self.focus.is_ducked()
    }

    pub fn has_focus(&self) -> bool {
        self.focus.is_held()
    }

    /// Whether a sleep timer with [`SleepAction::StopAndExit`] has fired
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Token of the most recent renderer load
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Playback position at `now`
    pub fn position(&self, now: ClockTime) -> u64 {
        match &self.state {
            PlaybackState::Playing { track, started_at } => {
                ProgressTracker::position(*started_at, now).min(track.duration_ms)
            }
            PlaybackState::Paused { position_ms, .. } => *position_ms,
            PlaybackState::Loading(_) | PlaybackState::Buffering(_) | PlaybackState::Idle => {
                self.resume_at_ms
            }
            PlaybackState::Ended | PlaybackState::Failed(_) => 0,
        }
    }

    /// Persistable picture of the session at `now`
    pub fn snapshot(&self, now: ClockTime) -> SessionSnapshot {
        SessionSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            queue_track_ids: self.queue.tracks().iter().map(|t| t.id.clone()).collect(),
            current_index: self.queue.current_index(),
            position_ms: self.position(now),
            repeat_mode: self.repeat,
            shuffle_mode: self.shuffle,
            shuffle_order: self.queue.shuffle_order().map(<[usize]>::to_vec),
            saved_at: Utc::now(),
        }
    }

    /// Observable picture of the session at `now`
    pub fn view(&self, now: ClockTime) -> SessionView {
        SessionView {
            state: self.state.kind(),
            track_id: self.state.track().map(|t| t.id.clone()),
            position_ms: self.position(now),
            queue: self.queue.snapshot(),
            repeat: self.repeat,
            shuffle: self.shuffle,
            sleep_timer: self.sleep.timer(),
            ducked: self.focus.is_ducked(),
            exit_requested: self.exit_requested,
        }
    }

    /// Take the effects recorded since the last drain
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Take the events recorded since the last drain
    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut self.events)
    }

    // ===== Playback commands =====

    /// Start playback
    ///
    /// Legal from `Idle` and `Failed`.
    pub fn play(&mut self, request: PlayRequest, now: ClockTime) -> Result<()> {
        if !matches!(self.state, PlaybackState::Idle | PlaybackState::Failed(_)) {
            return Err(self.illegal(CommandKind::Play));
        }

        let start_ms = match request {
            PlayRequest::Track(track) => {
                let index = match self.queue.position_of(&track.id) {
                    Some(index) => index,
                    None => {
                        let index = self.queue.insert_next(Arc::new(track));
                        self.queue_changed();
                        index
                    }
                };
                self.queue.jump_to(index)?;
                0
            }
            PlayRequest::Queue { tracks, index } => {
                self.queue.set_queue(
                    tracks.into_iter().map(Arc::new).collect(),
                    Some(index),
                    self.shuffle,
                )?;
                self.queue_changed();
                0
            }
            PlayRequest::Current => self.resume_at_ms,
        };

        let track = self
            .queue
            .current()
            .cloned()
            .ok_or_else(|| PlaybackError::invalid_queue("nothing to play: queue is empty"))?;
        self.begin_loading(track, start_ms, now);
        Ok(())
    }

    /// Pause playback (`Playing` only)
    pub fn pause(&mut self, now: ClockTime) -> Result<()> {
        self.pause_playing(now, CommandKind::Pause)?;
        self.focus.clear_paused_by_loss();
        Ok(())
    }

    /// Resume paused playback
    pub fn resume(&mut self, now: ClockTime) -> Result<()> {
        let PlaybackState::Paused { track, position_ms } = &self.state else {
            return Err(self.illegal(CommandKind::Resume));
        };
        let track = track.clone();
        let started_at = ProgressTracker::anchor(now, *position_ms);

        self.focus.clear_paused_by_loss();
        self.effects.push(Effect::Start);
        self.enter(PlaybackState::Playing { track, started_at }, now);
        Ok(())
    }

    /// Stop playback; legal in every state
    ///
    /// The stop position is kept so `play(Current)` can pick up from it.
    pub fn stop(&mut self, now: ClockTime) -> Result<()> {
        let position = self.position(now);
        let had_track = self.state.track().is_some();

        self.generation += 1;
        self.resume_at_ms = position;
        self.pause_pending = false;

        if had_track {
            self.effects.push(Effect::Stop);
        }
        self.enter(PlaybackState::Idle, now);
        self.checkpoint_now(now);
        Ok(())
    }

    /// Seek within the current track
    ///
    /// Legal from `Playing`, `Paused` and `Buffering`; the target is clamped
    /// to the track's duration and the state variant never changes.
    pub fn seek(&mut self, position_ms: u64, now: ClockTime) -> Result<()> {
        match &self.state {
            PlaybackState::Playing { .. }
            | PlaybackState::Paused { .. }
            | PlaybackState::Buffering(_) => {
                self.seek_to(position_ms, now);
                Ok(())
            }
            _ => Err(self.illegal(CommandKind::Seek)),
        }
    }

    /// Move to the next track
    ///
    /// `RepeatMode::One` behaves like `All` here: the user asked to move on.
    pub fn skip_next(&mut self, now: ClockTime) -> Result<()> {
        self.require_active(CommandKind::SkipNext)?;

        let repeat = match self.repeat {
            RepeatMode::One => RepeatMode::All,
            other => other,
        };

        match self.queue.next(repeat, self.shuffle) {
            Some(track) => self.begin_loading(track, 0, now),
            None => {
                self.effects.push(Effect::Stop);
                self.finish(now);
            }
        }
        Ok(())
    }

    /// Move to the previous track, or restart the current one
    ///
    /// Restarts when further in than the restart threshold or already at
    /// the first position.
    pub fn skip_previous(&mut self, now: ClockTime) -> Result<()> {
        self.require_active(CommandKind::SkipPrevious)?;

        if self.position(now) > self.restart_threshold_ms {
            self.restart(now);
            return Ok(());
        }

        match self.queue.previous() {
            Some(track) => self.begin_loading(track, 0, now),
            None => self.restart(now),
        }
        Ok(())
    }

    // ===== Modes and queue =====

    pub fn set_repeat_mode(&mut self, mode: RepeatMode, now: ClockTime) {
        self.repeat = mode;
        self.modes_changed();
        self.checkpoint_now(now);
    }

    /// Switch shuffle; the current track never changes
    pub fn set_shuffle_mode(&mut self, mode: ShuffleMode, now: ClockTime) {
        self.queue.apply_shuffle(mode);
        self.shuffle = mode;
        self.modes_changed();
        self.checkpoint_now(now);
    }

    /// Queue a track to play right after the current one
    ///
    /// Returns its index in the queue.
    pub fn insert_next(&mut self, track: Track, now: ClockTime) -> usize {
        let index = self.queue.insert_next(Arc::new(track));
        self.queue_changed();
        self.checkpoint_now(now);
        index
    }

    /// Remove a queue entry
    ///
    /// Removing the current track while active moves on to the following
    /// one, or to `Ended` when nothing follows. A paused session loads the
    /// following track but stays paused.
    pub fn remove(&mut self, index: usize, now: ClockTime) -> Result<()> {
        let removal = self.queue.remove(index)?;
        self.queue_changed();

        match removal {
            Removal::Current { removed, following } if self.is_active() => {
                info!("Removed current track {}", removed.id);
                let was_paused = matches!(self.state, PlaybackState::Paused { .. });
                match following {
                    Some(track) => {
                        self.begin_loading(track, 0, now);
                        self.pause_pending = was_paused;
                    }
                    None => {
                        self.effects.push(Effect::Stop);
                        self.finish(now);
                    }
                }
            }
            Removal::Current { .. } => {
                self.resume_at_ms = 0;
                self.checkpoint_now(now);
            }
            Removal::Other(_) => self.checkpoint_now(now),
        }
        Ok(())
    }

    /// Persist the current session
    pub fn checkpoint(&mut self, now: ClockTime) {
        self.checkpoint_now(now);
    }

    /// Apply a restored session (`Idle` only)
    ///
    /// Playback does not start; `play(PlayRequest::Current)` continues from
    /// the restored position.
    pub fn restore(&mut self, restored: RestoredSession, now: ClockTime) -> Result<()> {
        if !matches!(self.state, PlaybackState::Idle) {
            return Err(self.illegal(CommandKind::Restore));
        }

        let RestoredSession {
            tracks,
            current_index,
            position_ms,
            repeat_mode,
            shuffle_mode,
            shuffle_order,
        } = restored;

        self.queue.restore(
            tracks.into_iter().map(Arc::new).collect(),
            current_index,
            shuffle_order,
            shuffle_mode,
        );
        self.repeat = repeat_mode;
        self.shuffle = shuffle_mode;
        self.resume_at_ms = self
            .queue
            .current()
            .map_or(0, |track| if position_ms < track.duration_ms { position_ms } else { 0 });

        info!(
            "Restored session: {} tracks, index {:?}, position {}ms",
            self.queue.len(),
            self.queue.current_index(),
            self.position(now)
        );
        self.queue_changed();
        self.modes_changed();
        Ok(())
    }

    // ===== Sleep timer =====

    /// Arm (or re-arm) the sleep timer
    pub fn arm_sleep_timer(&mut self, duration_ms: u64, action: SleepAction, now: ClockTime) {
        let epoch = self.sleep.arm(now, duration_ms, action);
        info!("Sleep timer armed: {:?} in {}ms", action, duration_ms);
        self.effects.push(Effect::StartSleepTicker { epoch });
        self.sleep_changed();
    }

    /// Disarm the sleep timer; no-op when inactive
    pub fn cancel_sleep_timer(&mut self) {
        if self.sleep.cancel() {
            info!("Sleep timer cancelled");
            self.effects.push(Effect::StopSleepTicker);
            self.sleep_changed();
        }
    }

    /// Sleep ticker fired
    ///
    /// An expired timer issues its action through the regular command path;
    /// if the action is not valid right now it is logged and dropped.
    pub fn sleep_tick(&mut self, epoch: u64, now: ClockTime) {
        let action = match self.sleep.tick(epoch, now) {
            SleepTick::Fire(action) => action,
            SleepTick::Pending { remaining_ms } => {
                debug!("Sleep timer: {}ms remaining", remaining_ms);
                return;
            }
            SleepTick::Stale => return,
        };

        info!("Sleep timer expired: {:?}", action);
        self.effects.push(Effect::StopSleepTicker);
        self.sleep_changed();

        let result = match action {
            SleepAction::Pause => self.pause(now),
            SleepAction::Stop => self.stop(now),
            SleepAction::StopAndExit => {
                let result = self.stop(now);
                self.exit_requested = true;
                self.events.push(PlaybackEvent::ExitRequested);
                result
            }
        };

        if let Err(e) = result {
            warn!("Sleep timer action skipped: {}", e);
        }
    }

    // ===== Collaborator notifications =====

    /// A renderer load finished
    ///
    /// Results for superseded loads are ignored.
    pub fn load_finished(&mut self, generation: u64, result: std::result::Result<(), String>, now: ClockTime) {
        if generation != self.generation {
            debug!(
                "Ignoring result of superseded load {} (current {})",
                generation, self.generation
            );
            return;
        }
        let PlaybackState::Loading(track) = &self.state else {
            debug!("Ignoring load result while {}", self.state.kind());
            return;
        };
        let track = track.clone();

        match result {
            Ok(()) => {
                if self.resume_at_ms > 0 {
                    self.effects.push(Effect::Seek(self.resume_at_ms));
                }
                if std::mem::take(&mut self.pause_pending) {
                    let position_ms = self.resume_at_ms;
                    self.enter(PlaybackState::Paused { track, position_ms }, now);
                } else {
                    self.effects.push(Effect::Start);
                    let started_at = ProgressTracker::anchor(now, self.resume_at_ms);
                    self.enter(PlaybackState::Playing { track, started_at }, now);
                }
            }
            Err(reason) => self.fail(reason, now),
        }
    }

    /// Asynchronous renderer callback
    pub fn renderer_event(&mut self, event: RendererEvent, now: ClockTime) -> Result<()> {
        match event {
            RendererEvent::Buffering => {
                let PlaybackState::Playing { track, started_at } = &self.state else {
                    return Err(self.illegal(CommandKind::RendererBuffering));
                };
                let track = track.clone();
                self.resume_at_ms = ProgressTracker::position(*started_at, now).min(track.duration_ms);
                self.enter(PlaybackState::Buffering(track), now);
            }
            RendererEvent::Ready => match &self.state {
                PlaybackState::Buffering(track) => {
                    let track = track.clone();
                    if std::mem::take(&mut self.pause_pending) {
                        self.effects.push(Effect::Pause);
                        let position_ms = self.resume_at_ms;
                        self.enter(PlaybackState::Paused { track, position_ms }, now);
                    } else {
                        let started_at = ProgressTracker::anchor(now, self.resume_at_ms);
                        self.enter(PlaybackState::Playing { track, started_at }, now);
                    }
                }
                // Readiness of a load is reported by its tagged result
                PlaybackState::Loading(_) => debug!("Ignoring untagged ready while loading"),
                _ => return Err(self.illegal(CommandKind::RendererReady)),
            },
            RendererEvent::Error(reason) => {
                if !self.is_active() {
                    return Err(self.illegal(CommandKind::RendererError));
                }
                self.fail(reason, now);
            }
            RendererEvent::Completed => self.track_completed(now)?,
        }
        Ok(())
    }

    /// Current track reached its end
    pub fn track_completed(&mut self, now: ClockTime) -> Result<()> {
        let PlaybackState::Playing { track, .. } = &self.state else {
            return Err(self.illegal(CommandKind::TrackCompleted));
        };
        let finished = track.id.clone();
        debug!("Track {} completed", finished);
        self.events.push(PlaybackEvent::TrackFinished { track_id: finished });

        match self.queue.next(self.repeat, self.shuffle) {
            Some(next) => self.begin_loading(next, 0, now),
            None => self.finish(now),
        }
        Ok(())
    }

    /// Progress ticker fired
    pub fn progress_tick(&mut self, epoch: u64, now: ClockTime) {
        let PlaybackState::Playing { track, started_at } = &self.state else {
            return;
        };
        let (duration_ms, started_at) = (track.duration_ms, *started_at);

        match self.progress.tick(epoch, started_at, now, duration_ms) {
            Tick::Stale => {}
            Tick::Progress {
                position_ms,
                checkpoint_due,
            } => {
                self.events.push(PlaybackEvent::PositionUpdate {
                    position_ms,
                    duration_ms,
                });
                if checkpoint_due {
                    self.checkpoint_now(now);
                }
            }
            Tick::Completed => {
                if let Err(e) = self.track_completed(now) {
                    warn!("Completion tick dropped: {}", e);
                }
            }
        }
    }

    /// Result of a focus request
    pub fn focus_result(&mut self, epoch: u64, grant: FocusGrant, now: ClockTime) {
        match self.focus.resolve(epoch, grant) {
            GrantOutcome::Held => debug!("Audio focus granted"),
            GrantOutcome::Refused => {
                warn!("Audio focus denied");
                self.events.push(PlaybackEvent::Error {
                    message: PlaybackError::FocusDenied.to_string(),
                });
                match self.state.kind() {
                    StateKind::Playing => {
                        if let Err(e) = self.pause_playing(now, CommandKind::Pause) {
                            warn!("Pause after focus denial failed: {}", e);
                        }
                    }
                    StateKind::Loading | StateKind::Buffering => self.pause_pending = true,
                    _ => {}
                }
            }
            GrantOutcome::Stale { granted } => {
                debug!("Ignoring stale focus result {:?}", grant);
                if granted && !self.focus.is_held() && !self.focus.is_pending() {
                    self.effects.push(Effect::ReleaseFocus);
                }
            }
        }
    }

    /// Asynchronous focus callback from the host
    pub fn focus_change(&mut self, change: FocusChange, now: ClockTime) {
        match change {
            FocusChange::Lost => {
                info!("Audio focus lost");
                let was_ducked = self.focus.is_ducked();
                match self.state.kind() {
                    StateKind::Playing => {
                        self.focus.lost(true);
                        if let Err(e) = self.pause_playing(now, CommandKind::Pause) {
                            warn!("Pause after focus loss failed: {}", e);
                        }
                    }
                    StateKind::Loading | StateKind::Buffering => {
                        self.focus.lost(true);
                        self.pause_pending = true;
                    }
                    _ => self.focus.lost(false),
                }
                if was_ducked {
                    self.duck_changed(false);
                }
            }
            FocusChange::Duck => {
                if self.focus.set_ducked(true) {
                    self.duck_changed(true);
                }
            }
            FocusChange::Regained => {
                let was_ducked = self.focus.is_ducked();
                let resume = self.focus.regained();
                self.pause_pending = false;
                if was_ducked {
                    self.duck_changed(false);
                }

                if resume && matches!(self.state, PlaybackState::Paused { .. }) {
                    info!("Audio focus regained, resuming");
                    if let Err(e) = self.resume(now) {
                        warn!("Resume after focus regain failed: {}", e);
                    }
                } else if !self.wants_focus() && self.focus.release() {
                    self.effects.push(Effect::ReleaseFocus);
                }
            }
        }
    }

    // ===== Internal =====

    fn illegal(&self, command: CommandKind) -> PlaybackError {
        PlaybackError::illegal(self.state.kind(), command)
    }

    /// Whether a track is loaded or loading
    fn is_active(&self) -> bool {
        matches!(
            self.state.kind(),
            StateKind::Loading | StateKind::Playing | StateKind::Paused | StateKind::Buffering
        )
    }

    /// Only audible playback holds audio focus
    fn wants_focus(&self) -> bool {
        self.state.is_playing()
    }

    fn require_active(&self, command: CommandKind) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(self.illegal(command))
        }
    }

    fn pause_playing(&mut self, now: ClockTime, command: CommandKind) -> Result<()> {
        let PlaybackState::Playing { track, started_at } = &self.state else {
            return Err(self.illegal(command));
        };
        let track = track.clone();
        let position_ms = ProgressTracker::position(*started_at, now).min(track.duration_ms);

        self.effects.push(Effect::Pause);
        self.enter(PlaybackState::Paused { track, position_ms }, now);
        Ok(())
    }

    /// Switch state and run entry actions
    fn enter(&mut self, to: PlaybackState, now: ClockTime) {
        let from = self.state.kind();
        let kind = to.kind();
        self.state = to;

        if from != kind {
            debug!("Playback state: {} -> {}", from, kind);
            self.events.push(PlaybackEvent::StateChanged { from, to: kind });
        }

        match kind {
            StateKind::Playing => {
                let epoch = self.progress.start(self.position(now));
                self.effects.push(Effect::StartProgressTicker { epoch });
                if let Some(epoch) = self.focus.request() {
                    self.effects.push(Effect::AcquireFocus { epoch });
                }
                self.checkpoint_now(now);
            }
            StateKind::Paused => {
                self.stop_ticker();
                self.release_focus();
                self.checkpoint_now(now);
            }
            // Leaving Playing always gives focus back; the next Playing entry asks again
            StateKind::Loading
            | StateKind::Buffering
            | StateKind::Idle
            | StateKind::Ended
            | StateKind::Failed => {
                self.stop_ticker();
                self.release_focus();
            }
        }
    }

    fn begin_loading(&mut self, track: Arc<Track>, start_ms: u64, now: ClockTime) {
        self.generation += 1;
        self.resume_at_ms = if start_ms < track.duration_ms { start_ms } else { 0 };
        self.pause_pending = false;

        info!("Loading track {} ({})", track.id, track.title);
        let previous_track_id = self.last_track_id.replace(track.id.clone());
        self.events.push(PlaybackEvent::TrackChanged {
            track_id: track.id.clone(),
            previous_track_id,
        });
        self.effects.push(Effect::Load {
            track: track.clone(),
            generation: self.generation,
        });

        self.enter(PlaybackState::Loading(track), now);
        self.checkpoint_now(now);
    }

    fn finish(&mut self, now: ClockTime) {
        info!("Queue ended");
        self.resume_at_ms = 0;
        self.pause_pending = false;
        self.enter(PlaybackState::Ended, now);
        self.checkpoint_now(now);
    }

    fn fail(&mut self, reason: String, now: ClockTime) {
        error!("Playback failed: {}", reason);
        self.generation += 1;
        self.resume_at_ms = 0;
        self.pause_pending = false;
        self.events.push(PlaybackEvent::Error {
            message: reason.clone(),
        });
        self.enter(PlaybackState::Failed(reason), now);
    }

    fn restart(&mut self, now: ClockTime) {
        if matches!(self.state, PlaybackState::Loading(_)) {
            self.resume_at_ms = 0;
        } else {
            self.seek_to(0, now);
        }
    }

    fn seek_to(&mut self, position_ms: u64, now: ClockTime) {
        let Some(duration_ms) = self.state.track().map(|track| track.duration_ms) else {
            return;
        };
        let target = position_ms.min(duration_ms);

        match &mut self.state {
            PlaybackState::Playing { started_at, .. } => {
                *started_at = ProgressTracker::anchor(now, target);
            }
            PlaybackState::Paused { position_ms, .. } => *position_ms = target,
            PlaybackState::Buffering(_) => self.resume_at_ms = target,
            _ => return,
        }

        debug!("Seek to {}ms", target);
        self.effects.push(Effect::Seek(target));
        self.events.push(PlaybackEvent::PositionUpdate {
            position_ms: target,
            duration_ms,
        });
    }

    fn stop_ticker(&mut self) {
        if self.progress.stop() {
            self.effects.push(Effect::StopProgressTicker);
        }
    }

    fn release_focus(&mut self) {
        let was_ducked = self.focus.is_ducked();
        if self.focus.release() {
            self.effects.push(Effect::ReleaseFocus);
        }
        if was_ducked {
            self.duck_changed(false);
        }
    }

    fn checkpoint_now(&mut self, now: ClockTime) {
        let snapshot = self.snapshot(now);
        self.progress.checkpointed(snapshot.position_ms);
        self.effects.push(Effect::Checkpoint(snapshot));
    }

    fn queue_changed(&mut self) {
        self.events.push(PlaybackEvent::QueueChanged {
            length: self.queue.len(),
        });
    }

    fn modes_changed(&mut self) {
        self.events.push(PlaybackEvent::ModesChanged {
            repeat: self.repeat,
            shuffle: self.shuffle,
        });
    }

    fn sleep_changed(&mut self) {
        self.events.push(PlaybackEvent::SleepTimerChanged {
            timer: self.sleep.timer(),
        });
    }

    fn duck_changed(&mut self, ducked: bool) {
        self.effects.push(Effect::Duck(ducked));
        self.events.push(PlaybackEvent::DuckChanged { ducked });
    }
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, duration_ms: u64) -> Track {
        Track::new(TrackId::new(id), id.to_uppercase(), duration_ms)
    }

    fn loaded(controller: &mut PlaybackController, now: ClockTime) {
        let generation = controller.generation();
        controller.load_finished(generation, Ok(()), now);
    }

    #[test]
    fn superseded_load_result_is_ignored() {
        let mut controller = PlaybackController::default();
        controller
            .play(
                PlayRequest::Queue {
                    tracks: vec![track("a", 1000), track("b", 1000)],
                    index: 0,
                },
                0,
            )
            .unwrap();
        let stale = controller.generation();
        controller.skip_next(10).unwrap();

        controller.load_finished(stale, Ok(()), 20);
        assert_eq!(controller.state().kind(), StateKind::Loading);

        loaded(&mut controller, 30);
        assert_eq!(controller.state().track().unwrap().id.as_str(), "b");
        assert!(controller.state().is_playing());
    }

    #[test]
    fn playing_entry_requests_focus_and_ticker() {
        let mut controller = PlaybackController::default();
        controller.play(PlayRequest::Track(track("a", 1000)), 0).unwrap();
        controller.drain_effects();
        loaded(&mut controller, 5);

        let effects = controller.drain_effects();
        assert!(effects.contains(&Effect::Start));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartProgressTicker { .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::AcquireFocus { .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::Checkpoint(_))));
    }

    #[test]
    fn load_resumes_from_start_offset() {
        let mut controller = PlaybackController::default();
        controller.play(PlayRequest::Track(track("a", 100_000)), 0).unwrap();
        loaded(&mut controller, 0);
        controller.stop(40_000).unwrap();
        assert_eq!(controller.position(50_000), 40_000);

        controller.play(PlayRequest::Current, 50_000).unwrap();
        controller.drain_effects();
        loaded(&mut controller, 50_000);

        let effects = controller.drain_effects();
        assert_eq!(effects[0], Effect::Seek(40_000));
        assert_eq!(controller.position(51_000), 41_000);
    }

    #[test]
    fn failed_load_enters_failed_and_allows_replay() {
        let mut controller = PlaybackController::default();
        controller.play(PlayRequest::Track(track("a", 1000)), 0).unwrap();
        let generation = controller.generation();
        controller.load_finished(generation, Err("unsupported codec".into()), 1);

        assert_eq!(
            controller.state(),
            &PlaybackState::Failed("unsupported codec".into())
        );
        controller.play(PlayRequest::Current, 2).unwrap();
        assert_eq!(controller.state().kind(), StateKind::Loading);
    }

    #[test]
    fn stale_focus_grant_is_handed_back() {
        let mut controller = PlaybackController::default();
        controller.play(PlayRequest::Track(track("a", 10_000)), 0).unwrap();
        controller.drain_effects();
        loaded(&mut controller, 0);
        let epoch = controller
            .drain_effects()
            .into_iter()
            .find_map(|e| match e {
                Effect::AcquireFocus { epoch } => Some(epoch),
                _ => None,
            })
            .unwrap();

        controller.pause(100).unwrap();
        controller.drain_effects();
        controller.focus_result(epoch, FocusGrant::Granted, 200);

        assert_eq!(controller.drain_effects(), vec![Effect::ReleaseFocus]);
        assert!(!controller.has_focus());
    }
}
