//! Session runtime
//!
//! One tokio task owns the [`PlaybackController`] and drains a single command
//! channel, so handle calls, timer ticks, renderer callbacks and focus
//! callbacks form one ordered stream. After every message the runtime carries
//! out the controller's effects against the collaborators and publishes the
//! new [`SessionView`] and any [`PlaybackEvent`]s.
//!
//! Renderer loads and focus requests run as spawned tasks and report back
//! through the same channel, tagged with the generation/epoch they were
//! issued for. Tickers are spawned tasks that only send messages; they are
//! aborted as soon as the controller stops them.

use crate::clock::{ClockTime, SessionClock};
use crate::controller::{Effect, PlaybackController};
use crate::error::{PlaybackError, Result};
use crate::events::{PlaybackEvent, SessionView};
use crate::focus::{FocusArbiter, FocusGrant};
use crate::session_store::{RestoredSession, SessionStore};
use crate::types::{PlayRequest, RepeatMode, SessionConfig, ShuffleMode, SleepAction};
use cadence_core::{FocusChange, FocusHost, KeyValueStore, Renderer, RendererEvent, Track, TrackLibrary};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// External collaborators a session drives
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn Renderer>,
    pub focus_host: Arc<dyn FocusHost>,
    pub store: Arc<dyn KeyValueStore>,
    pub library: Arc<dyn TrackLibrary>,
}

#[derive(Debug)]
enum Command {
    Play(PlayRequest),
    Pause,
    Resume,
    Stop,
    Seek(u64),
    SkipNext,
    SkipPrevious,
    SetRepeatMode(RepeatMode),
    SetShuffleMode(ShuffleMode),
    ArmSleepTimer { duration_ms: u64, action: SleepAction },
    CancelSleepTimer,
    InsertNext(Track),
    Remove(usize),
    Checkpoint,
    Status,
}

#[derive(Debug)]
enum Output {
    Done,
    Inserted(usize),
    View(Box<SessionView>),
}

enum Message {
    Command {
        command: Command,
        reply: oneshot::Sender<Result<Output>>,
    },
    LoadFinished {
        generation: u64,
        result: std::result::Result<(), String>,
    },
    Renderer(RendererEvent),
    Focus(FocusChange),
    FocusResult {
        epoch: u64,
        grant: FocusGrant,
    },
    ProgressTick {
        epoch: u64,
    },
    SleepTick {
        epoch: u64,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running session
///
/// Every command is answered once the runtime has applied it, so the view
/// observed right after a command already reflects it.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Message>,
    view: watch::Receiver<SessionView>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl SessionHandle {
    /// Start a session on the current tokio runtime
    ///
    /// A persisted snapshot, if any, is restored before the first command is
    /// processed. Playback does not start on its own.
    pub fn spawn(config: SessionConfig, collaborators: Collaborators) -> Self {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let (view_tx, view) = watch::channel(SessionView::default());
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        let runtime = Runtime {
            controller: PlaybackController::new(&config),
            clock: SessionClock::new(),
            renderer: collaborators.renderer,
            focus: FocusArbiter::new(
                collaborators.focus_host,
                Duration::from_millis(config.focus_retry_delay_ms),
            ),
            store: SessionStore::spawn(collaborators.store, config.snapshot_key.clone()),
            library: collaborators.library,
            tx: tx.downgrade(),
            view: view_tx,
            events: events.clone(),
            load_task: None,
            progress_task: None,
            sleep_task: None,
            tick_interval: Duration::from_millis(config.tick_interval_ms.max(1)),
            sleep_tick_interval: Duration::from_millis(config.sleep_tick_interval_ms.max(1)),
        };
        tokio::spawn(runtime.run(rx));

        Self { tx, view, events }
    }

    // ===== Playback =====

    pub async fn play(&self, request: PlayRequest) -> Result<()> {
        self.request(Command::Play(request)).await.map(drop)
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Command::Pause).await.map(drop)
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(Command::Resume).await.map(drop)
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(Command::Stop).await.map(drop)
    }

    /// Seek to a position in milliseconds (clamped to the track)
    pub async fn seek(&self, position_ms: u64) -> Result<()> {
        self.request(Command::Seek(position_ms)).await.map(drop)
    }

    pub async fn skip_next(&self) -> Result<()> {
        self.request(Command::SkipNext).await.map(drop)
    }

    pub async fn skip_previous(&self) -> Result<()> {
        self.request(Command::SkipPrevious).await.map(drop)
    }

    // ===== Modes, queue, timer =====

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.request(Command::SetRepeatMode(mode)).await.map(drop)
    }

    pub async fn set_shuffle_mode(&self, mode: ShuffleMode) -> Result<()> {
        self.request(Command::SetShuffleMode(mode)).await.map(drop)
    }

    /// Arm the sleep timer, replacing any armed one
    pub async fn arm_sleep_timer(&self, duration_ms: u64, action: SleepAction) -> Result<()> {
        self.request(Command::ArmSleepTimer {
            duration_ms,
            action,
        })
        .await
        .map(drop)
    }

    pub async fn cancel_sleep_timer(&self) -> Result<()> {
        self.request(Command::CancelSleepTimer).await.map(drop)
    }

    /// Queue a track right after the current one; returns its index
    pub async fn insert_next(&self, track: Track) -> Result<usize> {
        match self.request(Command::InsertNext(track)).await? {
            Output::Inserted(index) => Ok(index),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn remove(&self, index: usize) -> Result<()> {
        self.request(Command::Remove(index)).await.map(drop)
    }

    /// Persist the session now
    pub async fn checkpoint(&self) -> Result<()> {
        self.request(Command::Checkpoint).await.map(drop)
    }

    /// Current view, computed by the runtime after all earlier messages
    pub async fn status(&self) -> Result<SessionView> {
        match self.request(Command::Status).await? {
            Output::View(view) => Ok(*view),
            other => Err(unexpected(&other)),
        }
    }

    // ===== Collaborator callbacks =====

    /// Deliver a renderer callback
    pub async fn renderer_event(&self, event: RendererEvent) -> Result<()> {
        self.send(Message::Renderer(event)).await
    }

    /// Deliver a focus callback from the host
    pub async fn focus_event(&self, change: FocusChange) -> Result<()> {
        self.send(Message::Focus(change)).await
    }

    // ===== Observation =====

    /// Latest published view
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Stream of views
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Stream of discrete events
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Checkpoint, flush persistence and stop the runtime
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.send(Message::Shutdown { reply }).await?;
        done.await.map_err(|_| PlaybackError::SessionClosed)
    }

    async fn request(&self, command: Command) -> Result<Output> {
        let (reply, response) = oneshot::channel();
        self.send(Message::Command { command, reply }).await?;
        response.await.map_err(|_| PlaybackError::SessionClosed)?
    }

    async fn send(&self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| PlaybackError::SessionClosed)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

fn unexpected(output: &Output) -> PlaybackError {
    PlaybackError::Persistence(format!("unexpected session reply: {output:?}"))
}

struct Runtime {
    controller: PlaybackController,
    clock: SessionClock,
    renderer: Arc<dyn Renderer>,
    focus: FocusArbiter,
    store: SessionStore,
    library: Arc<dyn TrackLibrary>,

    /// Weak so spawned tasks never keep the session alive
    tx: mpsc::WeakSender<Message>,
    view: watch::Sender<SessionView>,
    events: broadcast::Sender<PlaybackEvent>,

    load_task: Option<JoinHandle<()>>,
    progress_task: Option<JoinHandle<()>>,
    sleep_task: Option<JoinHandle<()>>,
    tick_interval: Duration,
    sleep_tick_interval: Duration,
}

impl Runtime {
    async fn run(mut self, mut rx: mpsc::Receiver<Message>) {
        info!("Playback session started");
        self.restore().await;
        self.publish();

        while let Some(message) = rx.recv().await {
            match message {
                Message::Command { command, reply } => {
                    let result = self.execute(command);
                    self.apply_effects().await;
                    self.publish();
                    // Caller may have given up waiting
                    let _ = reply.send(result);
                }
                Message::Shutdown { reply } => {
                    self.close().await;
                    let _ = reply.send(());
                    info!("Playback session stopped");
                    return;
                }
                other => {
                    self.notify(other);
                    self.apply_effects().await;
                    self.publish();
                }
            }
        }

        debug!("All session handles dropped");
        self.close().await;
    }

    fn now(&self) -> ClockTime {
        self.clock.now()
    }

    async fn restore(&mut self) {
        let Some(snapshot) = self.store.restore().await else {
            debug!("No session snapshot to restore");
            return;
        };

        match RestoredSession::resolve(snapshot, self.library.as_ref()).await {
            Ok(restored) => {
                let now = self.now();
                if let Err(e) = self.controller.restore(restored, now) {
                    warn!("Failed to apply restored session: {}", e);
                }
            }
            Err(e) => warn!("Failed to resolve restored session: {}", e),
        }
    }

    fn execute(&mut self, command: Command) -> Result<Output> {
        let now = self.now();
        let controller = &mut self.controller;
        debug!("Command: {:?}", command);

        match command {
            Command::Play(request) => controller.play(request, now)?,
            Command::Pause => controller.pause(now)?,
            Command::Resume => controller.resume(now)?,
            Command::Stop => controller.stop(now)?,
            Command::Seek(position_ms) => controller.seek(position_ms, now)?,
            Command::SkipNext => controller.skip_next(now)?,
            Command::SkipPrevious => controller.skip_previous(now)?,
            Command::SetRepeatMode(mode) => controller.set_repeat_mode(mode, now),
            Command::SetShuffleMode(mode) => controller.set_shuffle_mode(mode, now),
            Command::ArmSleepTimer {
                duration_ms,
                action,
            } => controller.arm_sleep_timer(duration_ms, action, now),
            Command::CancelSleepTimer => controller.cancel_sleep_timer(),
            Command::InsertNext(track) => {
                return Ok(Output::Inserted(controller.insert_next(track, now)));
            }
            Command::Remove(index) => controller.remove(index, now)?,
            Command::Checkpoint => controller.checkpoint(now),
            Command::Status => return Ok(Output::View(Box::new(controller.view(now)))),
        }
        Ok(Output::Done)
    }

    fn notify(&mut self, message: Message) {
        let now = self.now();
        let controller = &mut self.controller;

        match message {
            Message::LoadFinished { generation, result } => {
                controller.load_finished(generation, result, now);
            }
            Message::Renderer(event) => {
                if let Err(e) = controller.renderer_event(event, now) {
                    warn!("Ignoring renderer event: {}", e);
                }
            }
            Message::Focus(change) => controller.focus_change(change, now),
            Message::FocusResult { epoch, grant } => controller.focus_result(epoch, grant, now),
            Message::ProgressTick { epoch } => controller.progress_tick(epoch, now),
            Message::SleepTick { epoch } => controller.sleep_tick(epoch, now),
            Message::Command { .. } | Message::Shutdown { .. } => {}
        }
    }

    /// Carry out effects until the controller stops producing them
    async fn apply_effects(&mut self) {
        loop {
            let effects = self.controller.drain_effects();
            if effects.is_empty() {
                return;
            }
            for effect in effects {
                self.apply(effect).await;
            }
        }
    }

    async fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Load { track, generation } => {
                abort(&mut self.load_task);
                let renderer = self.renderer.clone();
                let tx = self.tx.clone();
                self.load_task = Some(tokio::spawn(async move {
                    let result = renderer.load(&track).await.map_err(|e| e.to_string());
                    deliver(&tx, Message::LoadFinished { generation, result }).await;
                }));
            }
            Effect::Start => {
                let result = self.renderer.start().await;
                self.renderer_result("start", result);
            }
            Effect::Pause => {
                let result = self.renderer.pause().await;
                self.renderer_result("pause", result);
            }
            Effect::Stop => {
                abort(&mut self.load_task);
                if let Err(e) = self.renderer.stop().await {
                    warn!("Renderer stop failed: {}", e);
                }
            }
            Effect::Seek(position_ms) => {
                let result = self.renderer.seek(Duration::from_millis(position_ms)).await;
                self.renderer_result("seek", result);
            }
            Effect::Duck(ducked) => self.renderer.set_ducked(ducked),
            Effect::AcquireFocus { epoch } => {
                let focus = self.focus.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let grant = focus.acquire_with_retry().await;
                    deliver(&tx, Message::FocusResult { epoch, grant }).await;
                });
            }
            Effect::ReleaseFocus => self.focus.release().await,
            Effect::StartProgressTicker { epoch } => {
                abort(&mut self.progress_task);
                self.progress_task = Some(spawn_ticker(
                    self.tx.clone(),
                    self.tick_interval,
                    false,
                    move || Message::ProgressTick { epoch },
                ));
            }
            Effect::StopProgressTicker => abort(&mut self.progress_task),
            Effect::StartSleepTicker { epoch } => {
                abort(&mut self.sleep_task);
                self.sleep_task = Some(spawn_ticker(
                    self.tx.clone(),
                    self.sleep_tick_interval,
                    true,
                    move || Message::SleepTick { epoch },
                ));
            }
            Effect::StopSleepTicker => abort(&mut self.sleep_task),
            Effect::Checkpoint(snapshot) => self.store.checkpoint(snapshot),
        }
    }

    /// A failed renderer call is reported like a renderer error callback
    fn renderer_result(&mut self, operation: &str, result: cadence_core::Result<()>) {
        if let Err(e) = result {
            error!("Renderer {} failed: {}", operation, e);
            let now = self.now();
            if let Err(e) = self
                .controller
                .renderer_event(RendererEvent::Error(e.to_string()), now)
            {
                warn!("Renderer failure not applied: {}", e);
            }
        }
    }

    fn publish(&mut self) {
        for event in self.controller.drain_events() {
            // No subscribers is fine
            let _ = self.events.send(event);
        }
        let view = self.controller.view(self.now());
        self.view.send_replace(view);
    }

    async fn close(&mut self) {
        let now = self.now();
        self.controller.checkpoint(now);
        self.apply_effects().await;
        self.publish();

        abort(&mut self.load_task);
        abort(&mut self.progress_task);
        abort(&mut self.sleep_task);
        self.store.flush().await;
    }
}

fn abort(task: &mut Option<JoinHandle<()>>) {
    if let Some(task) = task.take() {
        task.abort();
    }
}

async fn deliver(tx: &mpsc::WeakSender<Message>, message: Message) {
    if let Some(tx) = tx.upgrade() {
        // Session already gone
        let _ = tx.send(message).await;
    }
}

fn spawn_ticker<F>(
    tx: mpsc::WeakSender<Message>,
    period: Duration,
    immediate: bool,
    message: F,
) -> JoinHandle<()>
where
    F: Fn() -> Message + Send + 'static,
{
    tokio::spawn(async move {
        let start = if immediate {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let Some(tx) = tx.upgrade() else {
                return;
            };
            if tx.send(message()).await.is_err() {
                return;
            }
        }
    })
}
