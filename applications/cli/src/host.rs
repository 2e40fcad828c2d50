//! Session hosting
//!
//! Wires storage, the manifest library and the simulated collaborators into
//! a session and watches it until it has nothing left to do.

use crate::config::{StorageBackend, StorageSettings};
use crate::error::Result;
use crate::manifest::ManifestLibrary;
use crate::simulated::{GrantingFocusHost, SimulatedRenderer};
use cadence_core::KeyValueStore;
use cadence_playback::{
    Collaborators, PlaybackEvent, SessionHandle, SessionSnapshot, SessionView, StateKind,
};
use cadence_storage::{MemoryStore, SqliteStore};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Why a hosted session stopped being driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The queue played out
    Ended,
    /// The renderer could not play the current track
    Failed,
    /// The sleep timer asked the host to exit
    ExitRequested,
    /// The shutdown signal fired first
    Interrupted,
    /// The session runtime went away
    Closed,
}

/// Open the configured key/value backend
pub async fn open_store(settings: &StorageSettings) -> Result<Arc<dyn KeyValueStore>> {
    match settings.backend {
        StorageBackend::Memory => {
            info!("Using in-memory session storage");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Sqlite => {
            ensure_parent_dir(&settings.database_url).await?;
            let store = SqliteStore::connect(&settings.database_url).await?;
            info!("Session storage: {}", settings.database_url);
            Ok(Arc::new(store))
        }
    }
}

/// SQLite creates the file but not its directory
async fn ensure_parent_dir(database_url: &str) -> Result<()> {
    let path = database_url
        .trim_start_matches("sqlite:")
        .trim_start_matches("//");
    if path.is_empty() || path.starts_with(':') {
        return Ok(());
    }
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Collaborators for a headless session over `store` and `library`
pub fn collaborators(store: Arc<dyn KeyValueStore>, library: Arc<ManifestLibrary>) -> Collaborators {
    Collaborators {
        renderer: Arc::new(SimulatedRenderer::default()),
        focus_host: Arc::new(GrantingFocusHost),
        store,
        library,
    }
}

/// Follow a session until it ends, fails, requests exit or `shutdown` fires
pub async fn drive(handle: &SessionHandle, shutdown: impl Future<Output = ()>) -> Outcome {
    let mut views = handle.watch();
    let mut events = handle.subscribe();
    tokio::pin!(shutdown);

    loop {
        let outcome = settled(&views.borrow_and_update());
        if let Some(outcome) = outcome {
            return outcome;
        }

        tokio::select! {
            () = &mut shutdown => return Outcome::Interrupted,
            changed = views.changed() => {
                if changed.is_err() {
                    return Outcome::Closed;
                }
            }
            event = events.recv() => match event {
                Ok(event) => report(&event),
                Err(RecvError::Lagged(skipped)) => debug!("Skipped {} session events", skipped),
                Err(RecvError::Closed) => return Outcome::Closed,
            },
        }
    }
}

fn settled(view: &SessionView) -> Option<Outcome> {
    if view.exit_requested {
        return Some(Outcome::ExitRequested);
    }
    match view.state {
        StateKind::Ended => Some(Outcome::Ended),
        StateKind::Failed => Some(Outcome::Failed),
        _ => None,
    }
}

fn report(event: &PlaybackEvent) {
    match event {
        PlaybackEvent::TrackChanged { track_id, .. } => info!("Now playing {}", track_id),
        PlaybackEvent::TrackFinished { track_id } => info!("Finished {}", track_id),
        PlaybackEvent::StateChanged { from, to } => debug!("{} -> {}", from, to),
        PlaybackEvent::PositionUpdate {
            position_ms,
            duration_ms,
        } => debug!("{} / {}", format_ms(*position_ms), format_ms(*duration_ms)),
        PlaybackEvent::SleepTimerChanged { timer } => info!("Sleep timer: {:?}", timer),
        PlaybackEvent::Error { message } => warn!("Playback error: {}", message),
        _ => {}
    }
}

/// Human-readable summary of a persisted snapshot
pub fn describe_snapshot(snapshot: &SessionSnapshot) -> String {
    let current = snapshot
        .current_index
        .and_then(|index| snapshot.queue_track_ids.get(index))
        .map_or_else(|| "-".to_string(), ToString::to_string);

    format!(
        "saved:    {}\nqueue:    {} tracks\ncurrent:  {}\nposition: {}\nrepeat:   {}\nshuffle:  {}",
        snapshot.saved_at.format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.queue_track_ids.len(),
        current,
        format_ms(snapshot.position_ms),
        snapshot.repeat_mode,
        if snapshot.shuffle_mode.is_on() { "on" } else { "off" },
    )
}

/// `m:ss` rendering of a millisecond offset
pub fn format_ms(ms: u64) -> String {
    let seconds = ms / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
