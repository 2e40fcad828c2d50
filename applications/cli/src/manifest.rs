//! JSON track manifest
//!
//! A manifest is a JSON array of tracks. It is both the queue the `play`
//! command starts from and the library a restored session resolves its
//! track ids against.

use crate::error::{CliError, Result};
use async_trait::async_trait;
use cadence_core::{Track, TrackId, TrackLibrary};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ManifestLibrary {
    tracks: Vec<Track>,
    index: HashMap<TrackId, usize>,
}

impl ManifestLibrary {
    /// Read and validate a manifest file
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Self::parse(&path.display().to_string(), &bytes)
    }

    /// Parse manifest contents; `origin` names the source in errors
    pub fn parse(origin: &str, bytes: &[u8]) -> Result<Self> {
        let tracks: Vec<Track> =
            serde_json::from_slice(bytes).map_err(|e| CliError::manifest(origin, e.to_string()))?;

        if tracks.is_empty() {
            return Err(CliError::manifest(origin, "no tracks"));
        }

        let mut index = HashMap::with_capacity(tracks.len());
        for (position, track) in tracks.iter().enumerate() {
            if track.duration_ms == 0 {
                return Err(CliError::manifest(
                    origin,
                    format!("track {} has no duration", track.id),
                ));
            }
            if index.insert(track.id.clone(), position).is_some() {
                return Err(CliError::manifest(
                    origin,
                    format!("duplicate track id {}", track.id),
                ));
            }
        }

        Ok(Self { tracks, index })
    }

    /// Tracks in manifest order
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[async_trait]
impl TrackLibrary for ManifestLibrary {
    async fn resolve(&self, id: &TrackId) -> cadence_core::Result<Option<Track>> {
        Ok(self.index.get(id).map(|&position| self.tracks[position].clone()))
    }
}
