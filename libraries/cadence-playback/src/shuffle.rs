//! Shuffle permutations for queue advancement
//!
//! Shuffling never reorders the queue itself. It produces an auxiliary order
//! (a permutation of queue indices) so turning shuffle off restores the
//! original sequence for free.

use crate::types::ShuffleStrategy;
use cadence_core::Track;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

/// Build a shuffle order over `tracks`
///
/// When `pinned` is given, that index is placed first so the track that is
/// currently playing stays current after shuffle is enabled.
pub fn shuffle_order<R: Rng + ?Sized>(
    tracks: &[Arc<Track>],
    pinned: Option<usize>,
    strategy: ShuffleStrategy,
    rng: &mut R,
) -> Vec<usize> {
    let pinned = pinned.filter(|&index| index < tracks.len());
    let rest: Vec<usize> = (0..tracks.len())
        .filter(|&index| Some(index) != pinned)
        .collect();

    let shuffled = match strategy {
        ShuffleStrategy::Random => shuffle_random(rest, rng),
        ShuffleStrategy::SpreadArtists => shuffle_spread(tracks, rest, rng),
    };

    pinned.into_iter().chain(shuffled).collect()
}

/// Pure random shuffle using Fisher-Yates
fn shuffle_random<R: Rng + ?Sized>(mut indices: Vec<usize>, rng: &mut R) -> Vec<usize> {
    indices.shuffle(rng);
    indices
}

/// Artist-spreading shuffle
///
/// 1. Group indices by artist
/// 2. Randomize within each group and randomize the group order
/// 3. Round-robin through the groups so the same artist is spaced out
fn shuffle_spread<R: Rng + ?Sized>(
    tracks: &[Arc<Track>],
    indices: Vec<usize>,
    rng: &mut R,
) -> Vec<usize> {
    if indices.len() <= 2 {
        return shuffle_random(indices, rng);
    }

    let mut by_artist: HashMap<&str, Vec<usize>> = HashMap::new();
    for index in indices {
        by_artist
            .entry(tracks[index].artist.as_str())
            .or_default()
            .push(index);
    }

    let mut groups: Vec<Vec<usize>> = by_artist.into_values().collect();
    for group in &mut groups {
        group.shuffle(rng);
    }
    groups.shuffle(rng);

    let total: usize = groups.iter().map(Vec::len).sum();
    let mut result = Vec::with_capacity(total);
    let mut round = 0;
    while result.len() < total {
        for group in &groups {
            if let Some(&index) = group.get(round) {
                result.push(index);
            }
        }
        round += 1;
    }
    result
}

/// Whether `order` is a permutation of `0..len`
pub fn is_permutation(order: &[usize], len: usize) -> bool {
    if order.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &index in order {
        if index >= len || seen[index] {
            return false;
        }
        seen[index] = true;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::TrackId;
    use rand::thread_rng;

    fn tracks(artists: &[&str]) -> Vec<Arc<Track>> {
        artists
            .iter()
            .enumerate()
            .map(|(i, artist)| {
                Arc::new(Track::new(TrackId::new(format!("t{i}")), format!("Song {i}"), 1000).with_artist(*artist))
            })
            .collect()
    }

    #[test]
    fn pinned_index_comes_first() {
        let tracks = tracks(&["A", "B", "C", "D", "E"]);
        for pinned in 0..tracks.len() {
            let order = shuffle_order(&tracks, Some(pinned), ShuffleStrategy::Random, &mut thread_rng());
            assert_eq!(order[0], pinned);
            assert!(is_permutation(&order, tracks.len()));
        }
    }

    #[test]
    fn out_of_range_pin_is_ignored() {
        let tracks = tracks(&["A", "B"]);
        let order = shuffle_order(&tracks, Some(9), ShuffleStrategy::Random, &mut thread_rng());
        assert!(is_permutation(&order, 2));
    }

    #[test]
    fn empty_queue_yields_empty_order() {
        let order = shuffle_order(&[], None, ShuffleStrategy::SpreadArtists, &mut thread_rng());
        assert!(order.is_empty());
    }

    #[test]
    fn spread_shuffle_separates_artists() {
        let tracks = tracks(&["A", "A", "A", "B", "B", "B"]);
        let order = shuffle_order(&tracks, None, ShuffleStrategy::SpreadArtists, &mut thread_rng());
        assert!(is_permutation(&order, tracks.len()));

        // Two equal-sized groups interleave perfectly
        let consecutive = order
            .windows(2)
            .filter(|pair| tracks[pair[0]].artist == tracks[pair[1]].artist)
            .count();
        assert_eq!(consecutive, 0);
    }

    #[test]
    fn spread_shuffle_with_single_artist_keeps_every_track() {
        let tracks = tracks(&["A", "A", "A", "A"]);
        let order = shuffle_order(&tracks, Some(2), ShuffleStrategy::SpreadArtists, &mut thread_rng());
        assert_eq!(order[0], 2);
        assert!(is_permutation(&order, 4));
    }

    #[test]
    fn permutation_check_rejects_duplicates_and_gaps() {
        assert!(is_permutation(&[2, 0, 1], 3));
        assert!(!is_permutation(&[0, 0, 1], 3));
        assert!(!is_permutation(&[0, 1, 3], 3));
        assert!(!is_permutation(&[0, 1], 3));
    }
}
