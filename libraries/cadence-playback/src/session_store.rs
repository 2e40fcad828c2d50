//! Session persistence
//!
//! A single snapshot slot, overwritten on every checkpoint. Checkpoints are
//! handed to a background writer through a `watch` channel: the caller never
//! waits, intermediate snapshots are coalesced, and writes never reorder.
//! Failures are logged and otherwise ignored; losing a checkpoint only costs
//! a little resume accuracy.

use crate::error::Result;
use crate::types::{RepeatMode, ShuffleMode};
use cadence_core::{KeyValueStore, Track, TrackId, TrackLibrary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Snapshot layout version; snapshots with another version are discarded
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Everything needed to resume a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub schema_version: u32,
    pub queue_track_ids: Vec<TrackId>,
    pub current_index: Option<usize>,
    pub position_ms: u64,
    pub repeat_mode: RepeatMode,
    pub shuffle_mode: ShuffleMode,
    /// Shuffle permutation at checkpoint time
    #[serde(default)]
    pub shuffle_order: Option<Vec<usize>>,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Serialize to the persisted JSON form
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parse persisted bytes
    ///
    /// Truncated, malformed, or schema-mismatched data yields `None`.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let snapshot: Self = match serde_json::from_slice(bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Discarding unreadable session snapshot: {}", e);
                return None;
            }
        };

        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            warn!(
                "Discarding session snapshot with schema version {} (expected {})",
                snapshot.schema_version, SNAPSHOT_SCHEMA_VERSION
            );
            return None;
        }

        Some(snapshot)
    }
}

/// Snapshot with track IDs resolved against the library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredSession {
    pub tracks: Vec<Track>,
    pub current_index: Option<usize>,
    pub position_ms: u64,
    pub repeat_mode: RepeatMode,
    pub shuffle_mode: ShuffleMode,
    pub shuffle_order: Option<Vec<usize>>,
}

impl RestoredSession {
    /// Resolve a snapshot's track IDs through `library`
    ///
    /// IDs that no longer resolve are dropped. If the current track is gone,
    /// the nearest surviving track after it (or else before it) becomes
    /// current and the position restarts at zero.
    pub async fn resolve(snapshot: SessionSnapshot, library: &dyn TrackLibrary) -> Result<Self> {
        let resolved = library.resolve_all(&snapshot.queue_track_ids).await?;

        // Old index -> new index for every surviving track
        let mut remap = Vec::with_capacity(resolved.len());
        let mut tracks = Vec::with_capacity(resolved.len());
        for (old, track) in resolved.into_iter().enumerate() {
            match track {
                Some(track) => {
                    remap.push(Some(tracks.len()));
                    tracks.push(track);
                }
                None => {
                    debug!("Dropping unresolved track {}", snapshot.queue_track_ids[old]);
                    remap.push(None);
                }
            }
        }

        let (current_index, position_ms) = match snapshot.current_index {
            _ if tracks.is_empty() => (None, 0),
            Some(old) if old < remap.len() => match remap[old] {
                Some(new) => (Some(new), snapshot.position_ms),
                None => {
                    let following = remap[old..].iter().flatten().next().copied();
                    let preceding = remap[..old].iter().flatten().next_back().copied();
                    (following.or(preceding), 0)
                }
            },
            _ => (Some(0), 0),
        };

        let shuffle_order = snapshot.shuffle_order.map(|order| {
            order
                .into_iter()
                .filter_map(|old| remap.get(old).copied().flatten())
                .collect::<Vec<_>>()
        });

        Ok(Self {
            tracks,
            current_index,
            position_ms,
            repeat_mode: snapshot.repeat_mode,
            shuffle_mode: snapshot.shuffle_mode,
            shuffle_order,
        })
    }
}

/// Single-slot snapshot persistence over a key/value backend
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
    latest: watch::Sender<Option<(u64, SessionSnapshot)>>,
    written: watch::Receiver<u64>,
    seq: AtomicU64,
    restored: AtomicBool,
}

impl SessionStore {
    /// Create the store and spawn its background writer
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let (latest, pending) = watch::channel(None);
        let (written_tx, written) = watch::channel(0);

        tokio::spawn(write_loop(backend.clone(), key.clone(), pending, written_tx));

        Self {
            backend,
            key,
            latest,
            written,
            seq: AtomicU64::new(0),
            restored: AtomicBool::new(false),
        }
    }

    /// Queue a snapshot for writing; never blocks
    pub fn checkpoint(&self, snapshot: SessionSnapshot) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest.send_replace(Some((seq, snapshot)));
    }

    /// Wait until every checkpoint queued so far has been written (or failed)
    pub async fn flush(&self) {
        let target = self.seq.load(Ordering::SeqCst);
        let mut written = self.written.clone();
        if written.wait_for(|&seq| seq >= target).await.is_err() {
            warn!("Session writer stopped before flush completed");
        }
    }

    /// Read the persisted snapshot
    ///
    /// Consumed once: later calls return `None`.
    pub async fn restore(&self) -> Option<SessionSnapshot> {
        if self.restored.swap(true, Ordering::SeqCst) {
            return None;
        }

        match self.backend.read(&self.key).await {
            Ok(Some(bytes)) => SessionSnapshot::decode(&bytes),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read session snapshot: {}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("key", &self.key)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

async fn write_loop(
    backend: Arc<dyn KeyValueStore>,
    key: String,
    mut pending: watch::Receiver<Option<(u64, SessionSnapshot)>>,
    written: watch::Sender<u64>,
) {
    while pending.changed().await.is_ok() {
        let Some((seq, snapshot)) = pending.borrow_and_update().clone() else {
            continue;
        };

        match snapshot.encode() {
            Ok(bytes) => match backend.write(&key, &bytes).await {
                Ok(()) => debug!("Session checkpoint {} written", seq),
                Err(e) => warn!("Failed to write session checkpoint: {}", e),
            },
            Err(e) => warn!("Failed to encode session checkpoint: {}", e),
        }

        written.send_replace(seq);
    }
}
