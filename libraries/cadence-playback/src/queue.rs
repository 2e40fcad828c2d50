//! Play queue with repeat/shuffle-aware navigation
//!
//! The queue keeps tracks in the order they were given plus a cursor into
//! the *effective* order: the identity when shuffle is off, or a recorded
//! permutation when it is on.
//!
//! ```text
//! tracks:   [A, B, C, D]          (never reordered by shuffle)
//! order:    [2, 0, 3, 1]          (C, A, D, B)
//! cursor:       ^                 (current = tracks[order[1]] = A)
//! ```

use crate::error::{PlaybackError, Result};
use crate::shuffle::{is_permutation, shuffle_order};
use crate::types::{RepeatMode, ShuffleMode, ShuffleStrategy};
use cadence_core::{Track, TrackId};
use std::sync::Arc;

/// Result of removing a queue entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// A track other than the current one was removed
    Other(Arc<Track>),

    /// The current track was removed; the pointer moved to `following`
    /// (or stayed on the last remaining entry when nothing follows)
    Current {
        removed: Arc<Track>,
        following: Option<Arc<Track>>,
    },
}

/// Read-only projection of the queue for presentation layers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Tracks in original order
    pub tracks: Vec<Arc<Track>>,

    /// Index of the current track in `tracks`
    pub current_index: Option<usize>,

    /// Playback order as indices into `tracks`
    pub order: Vec<usize>,
}

/// Ordered track list plus a current pointer
///
/// Invariant: `current_index()` is `Some(i)` with `i < len()` whenever the
/// queue is non-empty, and `None` iff it is empty.
#[derive(Debug, Clone)]
pub struct Queue {
    tracks: Vec<Arc<Track>>,

    /// Shuffle permutation, present while shuffle is active
    order: Option<Vec<usize>>,

    /// Position in the effective order
    cursor: Option<usize>,

    strategy: ShuffleStrategy,
}

impl Queue {
    /// Create new empty queue
    pub fn new() -> Self {
        Self::with_strategy(ShuffleStrategy::default())
    }

    /// Create an empty queue with a shuffle strategy
    pub fn with_strategy(strategy: ShuffleStrategy) -> Self {
        Self {
            tracks: Vec::new(),
            order: None,
            cursor: None,
            strategy,
        }
    }

    // ===== Queries =====

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Tracks in original order
    pub fn tracks(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Track>> {
        self.tracks.get(index)
    }

    /// Index of the current track in original order
    pub fn current_index(&self) -> Option<usize> {
        self.cursor.map(|cursor| self.raw_index(cursor))
    }

    /// Current track
    pub fn current(&self) -> Option<&Arc<Track>> {
        self.current_index().and_then(|index| self.tracks.get(index))
    }

    /// Whether a shuffle permutation is active
    pub fn is_shuffled(&self) -> bool {
        self.order.is_some()
    }

    /// Active shuffle permutation
    pub fn shuffle_order(&self) -> Option<&[usize]> {
        self.order.as_deref()
    }

    /// Playback order as indices into `tracks()`
    pub fn effective_order(&self) -> Vec<usize> {
        self.order
            .clone()
            .unwrap_or_else(|| (0..self.tracks.len()).collect())
    }

    /// First index of a track with this ID
    pub fn position_of(&self, id: &TrackId) -> Option<usize> {
        self.tracks.iter().position(|track| &track.id == id)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            tracks: self.tracks.clone(),
            current_index: self.current_index(),
            order: self.effective_order(),
        }
    }

    // ===== Mutation =====

    /// Replace the queue atomically
    ///
    /// `start_index` is clamped to the last entry. An empty track list is only
    /// accepted without a start index and clears the queue.
    pub fn set_queue(
        &mut self,
        tracks: Vec<Arc<Track>>,
        start_index: Option<usize>,
        shuffle: ShuffleMode,
    ) -> Result<()> {
        if tracks.is_empty() {
            if let Some(index) = start_index {
                return Err(PlaybackError::invalid_queue(format!(
                    "start index {index} given for an empty queue"
                )));
            }
            self.clear();
            return Ok(());
        }

        let start = start_index.unwrap_or(0).min(tracks.len() - 1);
        self.tracks = tracks;
        self.order = None;
        self.cursor = Some(start);
        self.apply_shuffle(shuffle);
        Ok(())
    }

    /// Restore a persisted queue
    ///
    /// An `order` that is not a permutation of the tracks is discarded and,
    /// if `shuffle` is on, a fresh one is generated around the current track.
    pub fn restore(
        &mut self,
        tracks: Vec<Arc<Track>>,
        current_index: Option<usize>,
        order: Option<Vec<usize>>,
        shuffle: ShuffleMode,
    ) {
        if tracks.is_empty() {
            self.clear();
            return;
        }

        let current = current_index.unwrap_or(0).min(tracks.len() - 1);
        let order = order.filter(|order| shuffle.is_on() && is_permutation(order, tracks.len()));

        self.cursor = Some(match &order {
            Some(order) => order.iter().position(|&index| index == current).unwrap_or(0),
            None => current,
        });
        self.order = order;
        self.tracks = tracks;
        self.apply_shuffle(shuffle);
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.order = None;
        self.cursor = None;
    }

    /// Switch shuffle on or off
    ///
    /// Turning shuffle on generates one permutation with the current track
    /// pinned first; it stays stable until shuffle is turned off. Turning it
    /// off keeps the current track and returns to original order.
    pub fn apply_shuffle(&mut self, mode: ShuffleMode) {
        match (mode, self.order.is_some()) {
            (ShuffleMode::On, false) => {
                let current = self.current_index();
                let order = shuffle_order(
                    &self.tracks,
                    current,
                    self.strategy,
                    &mut rand::thread_rng(),
                );
                self.cursor = current.map(|_| 0);
                self.order = Some(order);
            }
            (ShuffleMode::Off, true) => {
                self.cursor = self.current_index();
                self.order = None;
            }
            _ => {}
        }
    }

    /// Insert a track right after the current one
    ///
    /// On an empty queue the track becomes current. Returns its index.
    pub fn insert_next(&mut self, track: Arc<Track>) -> usize {
        let Some(cursor) = self.cursor else {
            self.tracks = vec![track];
            self.order = self.order.as_ref().map(|_| vec![0]);
            self.cursor = Some(0);
            return 0;
        };

        let index = self.raw_index(cursor) + 1;
        self.tracks.insert(index, track);

        if let Some(order) = &mut self.order {
            for entry in order.iter_mut() {
                if *entry >= index {
                    *entry += 1;
                }
            }
            order.insert(cursor + 1, index);
        }

        index
    }

    /// Remove the track at `index` (original order)
    pub fn remove(&mut self, index: usize) -> Result<Removal> {
        if index >= self.tracks.len() {
            return Err(PlaybackError::invalid_queue(format!(
                "remove index {index} out of range for queue of {}",
                self.tracks.len()
            )));
        }

        let position = self.position_in_order(index);
        let removed = self.tracks.remove(index);

        if let Some(order) = &mut self.order {
            order.remove(position);
            for entry in order.iter_mut() {
                if *entry > index {
                    *entry -= 1;
                }
            }
        }

        let Some(cursor) = self.cursor else {
            return Ok(Removal::Other(removed));
        };

        if self.tracks.is_empty() {
            self.clear();
            return Ok(Removal::Current {
                removed,
                following: None,
            });
        }

        if position < cursor {
            self.cursor = Some(cursor - 1);
            Ok(Removal::Other(removed))
        } else if position > cursor {
            Ok(Removal::Other(removed))
        } else if cursor < self.tracks.len() {
            // The following entry slid into the cursor's position
            Ok(Removal::Current {
                removed,
                following: self.current().cloned(),
            })
        } else {
            self.cursor = Some(self.tracks.len() - 1);
            Ok(Removal::Current {
                removed,
                following: None,
            })
        }
    }

    /// Make the track at `index` (original order) current
    pub fn jump_to(&mut self, index: usize) -> Result<Arc<Track>> {
        let track = self.tracks.get(index).cloned().ok_or_else(|| {
            PlaybackError::invalid_queue(format!(
                "index {index} out of range for queue of {}",
                self.tracks.len()
            ))
        })?;
        self.cursor = Some(self.position_in_order(index));
        Ok(track)
    }

    // ===== Navigation =====

    /// Advance under the given repeat/shuffle policy
    ///
    /// - `Off`: next track, or `None` at the end (pointer stays on the last)
    /// - `All`: wraps to the start of the effective order
    /// - `One`: the current track again
    pub fn next(&mut self, repeat: RepeatMode, shuffle: ShuffleMode) -> Option<Arc<Track>> {
        self.apply_shuffle(shuffle);
        let cursor = self.cursor?;

        if repeat == RepeatMode::One {
            return self.current().cloned();
        }

        if cursor + 1 < self.tracks.len() {
            self.cursor = Some(cursor + 1);
        } else if repeat == RepeatMode::All {
            self.cursor = Some(0);
        } else {
            return None;
        }

        self.current().cloned()
    }

    /// Step back one position in the effective order
    ///
    /// Returns `None` only at the very first position.
    pub fn previous(&mut self) -> Option<Arc<Track>> {
        let cursor = self.cursor?;
        if cursor == 0 {
            return None;
        }
        self.cursor = Some(cursor - 1);
        self.current().cloned()
    }

    // ===== Internal =====

    fn raw_index(&self, position: usize) -> usize {
        match &self.order {
            Some(order) => order[position],
            None => position,
        }
    }

    fn position_in_order(&self, index: usize) -> usize {
        match &self.order {
            Some(order) => order
                .iter()
                .position(|&entry| entry == index)
                .unwrap_or(index),
            None => index,
        }
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}
