/// Track domain type
use crate::types::TrackId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playable track
///
/// Tracks are immutable values: when metadata changes the track is replaced
/// wholesale, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Unique track identifier
    pub id: TrackId,

    /// Track title
    pub title: String,

    /// Artist name
    #[serde(default)]
    pub artist: String,

    /// Album name
    #[serde(default)]
    pub album: Option<String>,

    /// Track duration in milliseconds
    pub duration_ms: u64,

    /// Opaque reference the renderer uses to open the audio (path or URI)
    #[serde(default)]
    pub source_ref: String,
}

impl Track {
    /// Create a new track with minimal metadata
    pub fn new(id: TrackId, title: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id,
            title: title.into(),
            artist: String::new(),
            album: None,
            duration_ms,
            source_ref: String::new(),
        }
    }

    /// Set the artist
    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    /// Set the album
    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    /// Set the renderer source reference
    #[must_use]
    pub fn with_source_ref(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = source_ref.into();
        self
    }

    /// Track duration
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_metadata() {
        let track = Track::new(TrackId::new("t1"), "Song", 1_500)
            .with_artist("Band")
            .with_album("Record")
            .with_source_ref("file:///music/song.ogg");

        assert_eq!(track.artist, "Band");
        assert_eq!(track.album.as_deref(), Some("Record"));
        assert_eq!(track.duration(), Duration::from_millis(1_500));
    }

    #[test]
    fn deserializes_with_optional_fields_missing() {
        let track: Track =
            serde_json::from_str(r#"{"id":"t1","title":"Song","duration_ms":1000}"#).unwrap();
        assert_eq!(track.artist, "");
        assert!(track.album.is_none());
        assert_eq!(track.source_ref, "");
    }
}
