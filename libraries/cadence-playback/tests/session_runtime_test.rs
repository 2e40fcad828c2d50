//! Session runtime integration tests
//!
//! Drive a real session task with mock collaborators on a paused tokio
//! clock, so progress ticks, sleep timers and focus retries run in virtual
//! time.

use async_trait::async_trait;
use cadence_core::{
    CoreError, FocusChange, FocusHost, FocusResponse, Renderer, RendererEvent, Track,
    TrackId, TrackLibrary,
};
use cadence_playback::{
    Collaborators, PlayRequest, PlaybackError, PlaybackEvent, RepeatMode, SessionConfig,
    SessionHandle, SessionView, ShuffleMode, SleepAction, StateKind,
};
use cadence_storage::MemoryStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ===== Test Helpers =====

/// Renderer that records every call
#[derive(Default)]
struct MockRenderer {
    calls: Mutex<Vec<String>>,
    load_delay: Duration,
    unreadable: Vec<String>,
}

impl MockRenderer {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn load(&self, track: &Track) -> cadence_core::Result<()> {
        self.record(format!("load:{}", track.id));
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        if self.unreadable.contains(&track.id.to_string()) {
            return Err(CoreError::renderer("unreadable file"));
        }
        Ok(())
    }

    async fn start(&self) -> cadence_core::Result<()> {
        self.record("start");
        Ok(())
    }

    async fn pause(&self) -> cadence_core::Result<()> {
        self.record("pause");
        Ok(())
    }

    async fn stop(&self) -> cadence_core::Result<()> {
        self.record("stop");
        Ok(())
    }

    async fn seek(&self, position: Duration) -> cadence_core::Result<()> {
        self.record(format!("seek:{}", position.as_millis()));
        Ok(())
    }

    fn set_ducked(&self, ducked: bool) {
        self.record(format!("ducked:{ducked}"));
    }
}

/// Focus host that always gives the same answer
struct FixedFocusHost(FocusResponse);

#[async_trait]
impl FocusHost for FixedFocusHost {
    async fn request(&self) -> cadence_core::Result<FocusResponse> {
        Ok(self.0)
    }

    async fn abandon(&self) -> cadence_core::Result<()> {
        Ok(())
    }
}

struct MapLibrary(HashMap<TrackId, Track>);

#[async_trait]
impl TrackLibrary for MapLibrary {
    async fn resolve(&self, id: &TrackId) -> cadence_core::Result<Option<Track>> {
        Ok(self.0.get(id).cloned())
    }
}

fn track(id: &str, duration_ms: u64) -> Track {
    Track::new(TrackId::new(id), format!("Track {id}"), duration_ms)
}

fn library() -> Vec<Track> {
    vec![track("A", 180_000), track("B", 200_000), track("C", 150_000)]
}

struct Harness {
    handle: SessionHandle,
    renderer: Arc<MockRenderer>,
    store: Arc<MemoryStore>,
}

fn spawn_with(renderer: MockRenderer, focus: FocusResponse, store: Arc<MemoryStore>) -> Harness {
    let renderer = Arc::new(renderer);
    let config = SessionConfig {
        event_buffer: 1024,
        ..SessionConfig::default()
    };
    let handle = SessionHandle::spawn(
        config,
        Collaborators {
            renderer: renderer.clone(),
            focus_host: Arc::new(FixedFocusHost(focus)),
            store: store.clone(),
            library: Arc::new(MapLibrary(
                library().into_iter().map(|t| (t.id.clone(), t)).collect(),
            )),
        },
    );
    Harness {
        handle,
        renderer,
        store,
    }
}

fn spawn_default() -> Harness {
    spawn_with(
        MockRenderer::default(),
        FocusResponse::Granted,
        Arc::new(MemoryStore::new()),
    )
}

async fn wait_until(
    handle: &SessionHandle,
    condition: impl FnMut(&SessionView) -> bool,
) -> SessionView {
    let mut views = handle.watch();
    let view = tokio::time::timeout(Duration::from_secs(600), views.wait_for(condition))
        .await
        .expect("timed out waiting for session view")
        .expect("session closed");
    view.clone()
}

async fn wait_for_state(handle: &SessionHandle, state: StateKind) -> SessionView {
    wait_until(handle, |view| view.state == state).await
}

async fn play_queue(handle: &SessionHandle, index: usize) {
    handle
        .play(PlayRequest::Queue {
            tracks: library(),
            index,
        })
        .await
        .unwrap();
}

// ===== Playback =====

#[tokio::test(start_paused = true)]
async fn test_play_reaches_playing() {
    let harness = spawn_default();
    play_queue(&harness.handle, 0).await;

    let view = wait_for_state(&harness.handle, StateKind::Playing).await;
    assert_eq!(view.track_id, Some(TrackId::new("A")));
    assert_eq!(view.queue.tracks.len(), 3);
    assert_eq!(harness.renderer.calls(), vec!["load:A", "start"]);
}

#[tokio::test(start_paused = true)]
async fn test_completion_advances_to_next_track() {
    let harness = spawn_default();
    let mut events = harness.handle.subscribe();
    play_queue(&harness.handle, 0).await;
    wait_for_state(&harness.handle, StateKind::Playing).await;

    tokio::time::sleep(Duration::from_millis(180_500)).await;

    let view = wait_until(&harness.handle, |view| {
        view.state == StateKind::Playing && view.track_id == Some(TrackId::new("B"))
    })
    .await;
    assert!(view.position_ms < 5_000);

    let mut finished = false;
    let mut changed_to_b = false;
    while let Ok(event) = events.try_recv() {
        match event {
            PlaybackEvent::TrackFinished { track_id } if track_id.as_str() == "A" => {
                finished = true;
            }
            PlaybackEvent::TrackChanged { track_id, .. } if track_id.as_str() == "B" => {
                changed_to_b = true;
            }
            _ => {}
        }
    }
    assert!(finished);
    assert!(changed_to_b);
}

#[tokio::test(start_paused = true)]
async fn test_pause_while_load_in_flight_is_illegal() {
    let harness = spawn_with(
        MockRenderer {
            load_delay: Duration::from_secs(5),
            ..MockRenderer::default()
        },
        FocusResponse::Granted,
        Arc::new(MemoryStore::new()),
    );
    play_queue(&harness.handle, 0).await;

    let err = harness.handle.pause().await.unwrap_err();
    assert!(matches!(
        err,
        PlaybackError::IllegalStateTransition {
            state: StateKind::Loading,
            ..
        }
    ));

    wait_for_state(&harness.handle, StateKind::Playing).await;
}

#[tokio::test(start_paused = true)]
async fn test_skip_during_load_ignores_stale_result() {
    let harness = spawn_with(
        MockRenderer {
            load_delay: Duration::from_secs(2),
            ..MockRenderer::default()
        },
        FocusResponse::Granted,
        Arc::new(MemoryStore::new()),
    );
    play_queue(&harness.handle, 0).await;
    harness.handle.skip_next().await.unwrap();

    let view = wait_for_state(&harness.handle, StateKind::Playing).await;
    assert_eq!(view.track_id, Some(TrackId::new("B")));
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_track_fails() {
    let harness = spawn_with(
        MockRenderer {
            unreadable: vec!["A".to_string()],
            ..MockRenderer::default()
        },
        FocusResponse::Granted,
        Arc::new(MemoryStore::new()),
    );
    play_queue(&harness.handle, 0).await;

    wait_for_state(&harness.handle, StateKind::Failed).await;

    // A new play recovers
    harness
        .handle
        .play(PlayRequest::Track(track("B", 200_000)))
        .await
        .unwrap();
    wait_for_state(&harness.handle, StateKind::Playing).await;
}

#[tokio::test(start_paused = true)]
async fn test_renderer_callbacks_drive_buffering_and_errors() {
    let harness = spawn_default();
    play_queue(&harness.handle, 0).await;
    wait_for_state(&harness.handle, StateKind::Playing).await;

    harness
        .handle
        .renderer_event(RendererEvent::Buffering)
        .await
        .unwrap();
    wait_for_state(&harness.handle, StateKind::Buffering).await;

    harness
        .handle
        .renderer_event(RendererEvent::Ready)
        .await
        .unwrap();
    wait_for_state(&harness.handle, StateKind::Playing).await;

    harness
        .handle
        .renderer_event(RendererEvent::Error("output device lost".into()))
        .await
        .unwrap();
    wait_for_state(&harness.handle, StateKind::Failed).await;
}

// ===== Focus =====

#[tokio::test(start_paused = true)]
async fn test_focus_loss_and_regain() {
    let harness = spawn_default();
    play_queue(&harness.handle, 0).await;
    wait_for_state(&harness.handle, StateKind::Playing).await;

    harness.handle.focus_event(FocusChange::Duck).await.unwrap();
    let view = wait_until(&harness.handle, |view| view.ducked).await;
    assert_eq!(view.state, StateKind::Playing);

    harness.handle.focus_event(FocusChange::Lost).await.unwrap();
    wait_for_state(&harness.handle, StateKind::Paused).await;

    harness
        .handle
        .focus_event(FocusChange::Regained)
        .await
        .unwrap();
    let view = wait_for_state(&harness.handle, StateKind::Playing).await;
    assert!(!view.ducked);

    let calls = harness.renderer.calls();
    assert!(calls.contains(&"ducked:true".to_string()));
    assert!(calls.contains(&"ducked:false".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_delayed_focus_falls_back_to_pause() {
    let harness = spawn_with(
        MockRenderer::default(),
        FocusResponse::Delayed,
        Arc::new(MemoryStore::new()),
    );
    play_queue(&harness.handle, 0).await;

    wait_for_state(&harness.handle, StateKind::Paused).await;
}

// ===== Sleep timer =====

#[tokio::test(start_paused = true)]
async fn test_sleep_timer_zero_pauses_on_first_tick() {
    let harness = spawn_default();
    play_queue(&harness.handle, 0).await;
    wait_for_state(&harness.handle, StateKind::Playing).await;

    harness
        .handle
        .arm_sleep_timer(0, SleepAction::Pause)
        .await
        .unwrap();

    let view = wait_for_state(&harness.handle, StateKind::Paused).await;
    assert!(!view.sleep_timer.is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_sleep_timer_cancel_leaves_playback_alone() {
    let harness = spawn_default();
    play_queue(&harness.handle, 0).await;
    wait_for_state(&harness.handle, StateKind::Playing).await;

    harness
        .handle
        .arm_sleep_timer(2_000, SleepAction::Stop)
        .await
        .unwrap();
    harness.handle.cancel_sleep_timer().await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    let view = harness.handle.status().await.unwrap();
    assert_eq!(view.state, StateKind::Playing);
    assert!(!view.sleep_timer.is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_sleep_timer_stop_and_exit() {
    let harness = spawn_default();
    play_queue(&harness.handle, 0).await;
    wait_for_state(&harness.handle, StateKind::Playing).await;

    harness
        .handle
        .arm_sleep_timer(2_000, SleepAction::StopAndExit)
        .await
        .unwrap();

    let view = wait_until(&harness.handle, |view| view.exit_requested).await;
    assert_eq!(view.state, StateKind::Idle);
    assert!(harness.renderer.calls().contains(&"stop".to_string()));
}

// ===== Persistence =====

#[tokio::test(start_paused = true)]
async fn test_checkpoint_restore_round_trip() {
    let store = Arc::new(MemoryStore::new());

    let first = spawn_with(MockRenderer::default(), FocusResponse::Granted, store.clone());
    play_queue(&first.handle, 1).await;
    wait_for_state(&first.handle, StateKind::Playing).await;
    first.handle.set_repeat_mode(RepeatMode::All).await.unwrap();
    first.handle.set_shuffle_mode(ShuffleMode::On).await.unwrap();
    first.handle.seek(42_000).await.unwrap();
    first.handle.pause().await.unwrap();
    let saved = first.handle.status().await.unwrap();
    first.handle.shutdown().await.unwrap();

    let second = spawn_with(MockRenderer::default(), FocusResponse::Granted, store);
    let restored = second.handle.status().await.unwrap();

    assert_eq!(restored.state, StateKind::Idle);
    assert_eq!(restored.queue.tracks, saved.queue.tracks);
    assert_eq!(restored.queue.current_index, saved.queue.current_index);
    assert_eq!(restored.queue.order, saved.queue.order);
    assert_eq!(restored.position_ms, 42_000);
    assert_eq!(restored.repeat, RepeatMode::All);
    assert_eq!(restored.shuffle, ShuffleMode::On);

    second.handle.play(PlayRequest::Current).await.unwrap();
    let view = wait_for_state(&second.handle, StateKind::Playing).await;
    assert_eq!(view.track_id, Some(TrackId::new("B")));
    assert_eq!(second.renderer.calls(), vec!["load:B", "seek:42000", "start"]);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_store_restores_nothing() {
    let harness = spawn_default();
    let view = harness.handle.status().await.unwrap();

    assert_eq!(view.state, StateKind::Idle);
    assert!(view.queue.tracks.is_empty());
    assert!(harness.store.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_checkpoint_is_persisted() {
    let harness = spawn_default();
    harness
        .handle
        .insert_next(track("C", 150_000))
        .await
        .unwrap();
    harness.handle.checkpoint().await.unwrap();
    harness.handle.shutdown().await.unwrap();

    assert_eq!(harness.store.len().await, 1);
}

// ===== Lifecycle =====

#[tokio::test(start_paused = true)]
async fn test_handle_after_shutdown_reports_closed() {
    let harness = spawn_default();
    harness.handle.shutdown().await.unwrap();

    let err = harness.handle.pause().await.unwrap_err();
    assert!(matches!(err, PlaybackError::SessionClosed));
}

#[tokio::test(start_paused = true)]
async fn test_queue_edits_through_handle() {
    let harness = spawn_default();
    play_queue(&harness.handle, 0).await;
    wait_for_state(&harness.handle, StateKind::Playing).await;

    let index = harness
        .handle
        .insert_next(track("X", 60_000))
        .await
        .unwrap();
    assert_eq!(index, 1);

    harness.handle.remove(0).await.unwrap();
    let view = wait_until(&harness.handle, |view| {
        view.state == StateKind::Playing && view.track_id == Some(TrackId::new("X"))
    })
    .await;
    assert_eq!(view.queue.tracks.len(), 3);

    let err = harness.handle.remove(99).await.unwrap_err();
    assert!(matches!(err, PlaybackError::InvalidQueue(_)));
}
