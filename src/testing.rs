//! In-memory `Catalog` for workflow tests.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::models::{ArtistCandidate, ArtistCredit, Playlist, TrackPayload};
use crate::normalize::{extract_playlist_id, name_key};
use crate::spotify::{check_batch_size, Catalog};

#[derive(Default)]
pub struct FakeCatalog {
    /// Track metadata by Spotify id.
    pub tracks: FxHashMap<String, TrackPayload>,
    /// Search results by title name key.
    pub searches: FxHashMap<String, TrackPayload>,
    /// Titles whose search fails with a catalog error.
    pub failing_titles: FxHashSet<String>,
    /// Artist search results by name key.
    pub artists: FxHashMap<String, Vec<ArtistCandidate>>,
    pub playlists: FxHashMap<String, Playlist>,
    pub requests: usize,
}

pub fn track(id: &str, title: &str, artists: &[(&str, &str)]) -> TrackPayload {
    TrackPayload {
        spotify_id: id.to_string(),
        title: title.to_string(),
        artists: artists
            .iter()
            .map(|(artist_id, name)| ArtistCredit::new(*artist_id, *name))
            .collect(),
        ..Default::default()
    }
}

impl FakeCatalog {
    pub fn with_search(mut self, title: &str, track: TrackPayload) -> Self {
        self.searches.insert(name_key(title), track);
        self
    }
}

impl Catalog for FakeCatalog {
    fn search_track(&mut self, title: &str, _artist: &str) -> Result<Option<TrackPayload>> {
        self.requests += 1;
        if self.failing_titles.contains(title) {
            return Err(Error::Catalog(format!("search failed for {}", title)));
        }
        Ok(self.searches.get(&name_key(title)).cloned())
    }

    fn tracks_by_id(&mut self, ids: &[String]) -> Result<Vec<Option<TrackPayload>>> {
        check_batch_size(ids)?;
        self.requests += 1;
        Ok(ids.iter().map(|id| self.tracks.get(id).cloned()).collect())
    }

    fn search_artists(&mut self, name: &str) -> Result<Vec<ArtistCandidate>> {
        self.requests += 1;
        Ok(self.artists.get(&name_key(name)).cloned().unwrap_or_default())
    }

    fn playlist(&mut self, playlist_ref: &str) -> Result<Playlist> {
        self.requests += 1;
        let id = extract_playlist_id(playlist_ref)
            .ok_or_else(|| Error::Catalog("empty playlist reference".to_string()))?;
        self.playlists
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Catalog(format!("playlist {} not found", id)))
    }
}
